use std::collections::HashMap;
use std::time::{Duration, Instant};

use mio::Token;

/// The timer is only ever touched by the reactor thread (SPEC_FULL.md
/// §5), so its callbacks need not be `Send`; this lets the server capture
/// a plain `Rc<RefCell<_>>` rather than an `Arc<Mutex<_>>` when recording
/// which connections timed out.
type Callback = Box<dyn FnOnce(Token)>;

struct TimerNode {
    id: Token,
    expires: Instant,
    callback: Callback,
}

/// Binary min-heap of per-connection idle-timeout deadlines, keyed by
/// `mio::Token`, with an auxiliary `id -> index` map so `add`/`adjust`/
/// removal are all O(log n). Direct translation of the original project's
/// `HeapTimer` (heap_ vector + ref_ unordered_map).
pub struct TimerHeap {
    heap: Vec<TimerNode>,
    index_of: HashMap<Token, usize>,
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHeap {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a fresh timer for `id`, or reschedules it in place if one
    /// already exists (never duplicates an id).
    pub fn add(&mut self, id: Token, timeout: Duration, callback: Callback) {
        let expires = Instant::now() + timeout;
        if let Some(&i) = self.index_of.get(&id) {
            self.heap[i].expires = expires;
            self.heap[i].callback = callback;
            if !self.sift_down(i, self.heap.len()) {
                self.sift_up(i);
            }
        } else {
            let i = self.heap.len();
            self.heap.push(TimerNode {
                id,
                expires,
                callback,
            });
            self.index_of.insert(id, i);
            self.sift_up(i);
        }
    }

    /// Extends an existing timer's deadline. No-op if `id` is not tracked.
    pub fn adjust(&mut self, id: Token, timeout: Duration) {
        if let Some(&i) = self.index_of.get(&id) {
            self.heap[i].expires = Instant::now() + timeout;
            self.sift_down(i, self.heap.len());
        }
    }

    /// Fires `id`'s callback immediately (if tracked) and removes it.
    pub fn do_work(&mut self, id: Token) {
        if let Some(&i) = self.index_of.get(&id) {
            let node = self.remove_at(i);
            (node.callback)(node.id);
        }
    }

    /// Pops and fires every node whose deadline has already passed.
    pub fn tick(&mut self) {
        let now = Instant::now();
        while let Some(node) = self.heap.first() {
            if node.expires > now {
                break;
            }
            let node = self.remove_at(0);
            (node.callback)(node.id);
        }
    }

    /// Runs `tick()` then reports the delay in milliseconds until the next
    /// deadline, or `None` if the heap is empty (caller should block
    /// indefinitely on the multiplexer in that case).
    pub fn next_tick_ms(&mut self) -> Option<u64> {
        self.tick();
        self.heap.first().map(|node| {
            let now = Instant::now();
            if node.expires > now {
                (node.expires - now).as_millis() as u64
            } else {
                0
            }
        })
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.index_of.clear();
    }

    fn remove_at(&mut self, i: usize) -> TimerNode {
        let last = self.heap.len() - 1;
        self.swap_nodes(i, last);
        let node = self.heap.pop().expect("remove_at on empty heap");
        self.index_of.remove(&node.id);
        if i < self.heap.len() {
            if !self.sift_down(i, self.heap.len()) {
                self.sift_up(i);
            }
        }
        node
    }

    fn swap_nodes(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.index_of.insert(self.heap[i].id, i);
        self.index_of.insert(self.heap[j].id, j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].expires <= self.heap[i].expires {
                break;
            }
            self.swap_nodes(i, parent);
            i = parent;
        }
    }

    /// Returns true if any swap occurred.
    fn sift_down(&mut self, mut i: usize, n: usize) -> bool {
        let start = i;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < n && self.heap[left].expires < self.heap[smallest].expires {
                smallest = left;
            }
            if right < n && self.heap[right].expires < self.heap[smallest].expires {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap_nodes(i, smallest);
            i = smallest;
        }
        i != start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn token(n: usize) -> Token {
        Token(n)
    }

    #[test]
    fn root_is_always_minimum() {
        let mut heap = TimerHeap::new();
        let fired: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let order = [50, 10, 40, 20, 30];
        for (i, ms) in order.iter().enumerate() {
            let fired = Arc::clone(&fired);
            heap.add(token(i), Duration::from_millis(*ms), Box::new(move |t| {
                fired.lock().unwrap().push(t.0);
            }));
        }

        // Force every node to be already-expired so tick() drains in order.
        std::thread::sleep(Duration::from_millis(60));
        heap.tick();
        assert_eq!(*fired.lock().unwrap(), vec![1, 3, 4, 2, 0]);
        assert!(heap.is_empty());
    }

    #[test]
    fn add_on_existing_id_reschedules_not_duplicates() {
        let mut heap = TimerHeap::new();
        heap.add(token(1), Duration::from_millis(1000), Box::new(|_| {}));
        heap.add(token(1), Duration::from_millis(5), Box::new(|_| {}));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn do_work_fires_and_removes() {
        let mut heap = TimerHeap::new();
        let fired = Arc::new(Mutex::new(false));
        let fired2 = Arc::clone(&fired);
        heap.add(token(7), Duration::from_secs(10), Box::new(move |_| {
            *fired2.lock().unwrap() = true;
        }));
        heap.do_work(token(7));
        assert!(*fired.lock().unwrap());
        assert_eq!(heap.len(), 0);
    }
}
