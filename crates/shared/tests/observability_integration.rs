//! 可观测性模块集成测试
//!
//! 指标测试使用局部 recorder，不依赖全局安装，也不需要监听端口。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use order_shared::observability::metrics::{
        MessageOutcome, record_cache_lookup, record_db_get, record_db_save, record_kafka_message,
    };

    /// 在局部 recorder 下执行 `f`，返回 Prometheus 文本格式的输出
    fn render(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_cache_lookup_counters() {
        let output = render(|| {
            record_cache_lookup(true);
            record_cache_lookup(true);
            record_cache_lookup(false);
        });

        assert!(output.contains("cache_hits_total 2"));
        assert!(output.contains("cache_misses_total 1"));
    }

    #[test]
    fn test_kafka_outcome_counters() {
        let output = render(|| {
            record_kafka_message(MessageOutcome::Processed);
            record_kafka_message(MessageOutcome::Processed);
            record_kafka_message(MessageOutcome::Bad);
            record_kafka_message(MessageOutcome::Failed);
            record_kafka_message(MessageOutcome::Failed);
            record_kafka_message(MessageOutcome::Failed);
        });

        assert!(output.contains("kafka_messages_total 2"));
        assert!(output.contains("kafka_bad_messages_total 1"));
        assert!(output.contains("kafka_processing_errors_total 3"));
    }

    #[test]
    fn test_db_duration_histograms() {
        let output = render(|| {
            record_db_get(0.004);
            record_db_save(0.02);
            record_db_save(0.03);
        });

        assert!(output.contains("db_get_order_duration_seconds"));
        assert!(output.contains("db_save_order_duration_seconds_count 2"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_cache_lookup(true);
        record_db_get(0.0);
        record_kafka_message(MessageOutcome::Bad);
    }
}

// ============================================================================
// 初始化测试
// ============================================================================

mod init_tests {
    use order_shared::observability::{self, ObservabilityConfig};

    #[tokio::test]
    async fn test_init_without_metrics_server() {
        let config = ObservabilityConfig {
            service_name: "order-service-test".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: false,
            ..Default::default()
        };

        let guard = observability::init(&config).await.unwrap();
        tracing::info!(order_uid = "b563feb7b2b84b6test", "order saved");
        drop(guard);
    }
}
