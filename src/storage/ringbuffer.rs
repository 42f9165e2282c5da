/// Fixed-capacity ring buffer whose most recent contents are always readable
/// as one contiguous slice. Every write lands twice, once in each half of the
/// backing storage, so no copy is needed when the window wraps.
pub struct SliceableRingBuffer<T: Clone> {
    buffer: Vec<T>,
    write_position: usize,
    capacity: usize,
    filled: usize,
}

impl<T: Clone> SliceableRingBuffer<T> {
    pub fn new(capacity: usize, default_value: T) -> Self {
        let capacity = capacity.max(1);
        SliceableRingBuffer {
            buffer: vec![default_value; capacity * 2],
            write_position: 0,
            capacity,
            filled: 0,
        }
    }

    pub fn write(&mut self, data: T) {
        self.buffer[self.write_position] = data.clone();
        self.buffer[self.write_position + self.capacity] = data;

        self.write_position = (self.write_position + 1) % self.capacity;
        self.filled = (self.filled + 1).min(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets all written values. The backing storage is kept.
    pub fn clear(&mut self) {
        self.write_position = 0;
        self.filled = 0;
    }

    /// Everything written so far (at most `capacity` values), oldest first.
    pub fn get_slice(&self) -> &[T] {
        self.get_slice_with_len(self.filled)
    }

    /// The last `len` values written, oldest first. `len` is clamped to what
    /// has actually been written.
    pub fn get_slice_with_len(&self, len: usize) -> &[T] {
        let len = len.min(self.filled);
        let start = (self.write_position + (self.capacity - len)) % self.capacity;
        &self.buffer[start..start + len]
    }

    pub fn last(&self) -> Option<&T> {
        self.get_slice_with_len(1).first()
    }
}

#[cfg(test)]
mod tests {
    use super::SliceableRingBuffer;

    #[test]
    fn starts_empty() {
        let rb = SliceableRingBuffer::new(5, 0);
        assert!(rb.is_empty());
        assert_eq!(rb.get_slice(), &[] as &[i32]);
        assert_eq!(rb.last(), None);
    }

    #[test]
    fn partially_filled() {
        let mut rb = SliceableRingBuffer::new(5, 0);
        for i in 1..=3 {
            rb.write(i);
        }
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.get_slice(), &[1, 2, 3]);
        assert_eq!(rb.last(), Some(&3));
    }

    #[test]
    fn wraps_to_last_capacity_values() {
        let mut rb = SliceableRingBuffer::new(5, 0);
        for i in 1..=13 {
            rb.write(i);
        }
        assert_eq!(rb.len(), 5);
        assert_eq!(rb.get_slice(), &[9, 10, 11, 12, 13]);
        assert_eq!(rb.get_slice_with_len(3), &[11, 12, 13]);
        assert_eq!(rb.get_slice_with_len(50), &[9, 10, 11, 12, 13]);
    }

    #[test]
    fn clear_forgets_contents() {
        let mut rb = SliceableRingBuffer::new(4, 0);
        for i in 1..=6 {
            rb.write(i);
        }
        rb.clear();
        assert!(rb.is_empty());
        rb.write(42);
        assert_eq!(rb.get_slice(), &[42]);
    }
}
