//! O(1) LRU 映射
//!
//! 哈希索引 + 以 Vec 为槽位的双向链表：链表头是最近使用，链表尾是最久未使用。
//! 命中、插入、淘汰都只做常数次指针调整，不扫描。
//! 本结构不做同步，由外层互斥锁保证 get/put 的原子性。

use std::collections::HashMap;

#[derive(Debug)]
struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// 固定容量的 LRU 映射
#[derive(Debug)]
pub struct LruMap<V> {
    capacity: usize,
    index: HashMap<String, usize>,
    nodes: Vec<Node<V>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> LruMap<V> {
    /// 创建容量为 `capacity` 的映射，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 查找并把命中的键移到最近使用位置
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        Some(&self.nodes[idx].value)
    }

    /// 只读查看，不刷新最近使用顺序
    #[cfg(test)]
    fn peek(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.nodes[idx].value)
    }

    /// 插入或替换，并刷新最近使用顺序
    ///
    /// 插入新键导致超出容量时淘汰恰好一个最久未使用的条目并返回它。
    pub fn put(&mut self, key: String, value: V) -> Option<(String, V)> {
        if let Some(&idx) = self.index.get(&key) {
            self.nodes[idx].value = value;
            self.move_to_front(idx);
            return None;
        }

        if self.nodes.len() < self.capacity {
            let idx = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.attach_front(idx);
            self.index.insert(key, idx);
            return None;
        }

        // 已满：复用链表尾部（最久未使用）的槽位
        let idx = self.tail?;
        self.detach(idx);
        let node = &mut self.nodes[idx];
        let old_key = std::mem::replace(&mut node.key, key.clone());
        let old_value = std::mem::replace(&mut node.value, value);
        self.index.remove(&old_key);
        self.index.insert(key, idx);
        self.attach_front(idx);

        Some((old_key, old_value))
    }

    /// 按最近使用到最久未使用的顺序列出键
    #[cfg(test)]
    fn keys_by_recency(&self) -> Vec<&str> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.nodes[idx].key.as_str());
            cursor = self.nodes[idx].next;
        }
        keys
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[idx];
        node.prev = None;
        node.next = None;
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx];
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.nodes[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut map = LruMap::new(3);
        assert!(map.put("a".to_string(), 1).is_none());
        assert!(map.put("b".to_string(), 2).is_none());

        assert_eq!(map.get("a"), Some(&1));
        assert_eq!(map.get("b"), Some(&2));
        assert_eq!(map.get("c"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut map = LruMap::new(2);
        map.put("a".to_string(), 1);
        map.put("b".to_string(), 2);

        let evicted = map.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("a".to_string(), 1)));
        assert_eq!(map.len(), 2);
        assert!(map.peek("a").is_none());
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut map = LruMap::new(2);
        map.put("a".to_string(), 1);
        map.put("b".to_string(), 2);
        map.get("a");

        let evicted = map.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert_eq!(map.keys_by_recency(), vec!["c", "a"]);
    }

    #[test]
    fn test_replace_existing_does_not_evict() {
        let mut map = LruMap::new(2);
        map.put("a".to_string(), 1);
        map.put("b".to_string(), 2);

        assert!(map.put("a".to_string(), 10).is_none());
        assert_eq!(map.len(), 2);
        assert_eq!(map.peek("a"), Some(&10));
        assert_eq!(map.keys_by_recency(), vec!["a", "b"]);
    }

    #[test]
    fn test_capacity_one() {
        let mut map = LruMap::new(0);
        assert_eq!(map.capacity(), 1);

        map.put("a".to_string(), 1);
        assert_eq!(map.put("b".to_string(), 2), Some(("a".to_string(), 1)));
        assert_eq!(map.get("b"), Some(&2));
        assert_eq!(map.keys_by_recency(), vec!["b"]);
    }

    #[test]
    fn test_long_sequence_keeps_list_consistent() {
        let mut map = LruMap::new(3);
        for i in 0..20 {
            map.put(format!("k{i}"), i);
            if i % 2 == 0 {
                map.get(&format!("k{}", i.max(1) - 1));
            }
        }

        assert_eq!(map.len(), 3);
        let keys = map.keys_by_recency();
        assert_eq!(keys.len(), 3);
        for key in keys {
            assert!(map.peek(key).is_some());
        }
    }
}
