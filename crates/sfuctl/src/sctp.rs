use crate::error::{Error, Result};

/// SCTP stream id allocator for one transport.
///
/// A bitmap sized to the negotiated maximum incoming streams. Allocation
/// scans circularly from a rotating cursor, so released ids are reused only
/// after every other id has been handed out.
#[derive(Debug, Clone)]
pub struct SctpStreamIds {
    used: Vec<bool>,
    next: usize,
}

impl SctpStreamIds {
    pub fn new(num_streams: u16) -> Self {
        Self {
            used: vec![false; usize::from(num_streams)],
            next: 0,
        }
    }

    /// Claim the next free id.
    pub fn allocate(&mut self) -> Result<u16> {
        let len = self.used.len();
        for offset in 0..len {
            let idx = (self.next + offset) % len;
            if !self.used[idx] {
                self.used[idx] = true;
                self.next = idx + 1;
                // `len` comes from a u16, so every index fits.
                return u16::try_from(idx).map_err(|_| Error::NoSctpStreamId);
            }
        }
        Err(Error::NoSctpStreamId)
    }

    /// Free an id. Unknown ids are ignored.
    pub fn release(&mut self, id: u16) {
        if let Some(slot) = self.used.get_mut(usize::from(id)) {
            *slot = false;
        }
    }

    pub fn is_used(&self, id: u16) -> bool {
        self.used.get(usize::from(id)).copied().unwrap_or(false)
    }

    pub fn in_use(&self) -> usize {
        self.used.iter().filter(|u| **u).count()
    }

    pub fn capacity(&self) -> usize {
        self.used.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_every_slot_before_reuse() {
        let mut ids = SctpStreamIds::new(4);
        let mut seen = Vec::new();
        for _ in 0..8 {
            let id = ids.allocate().unwrap();
            seen.push(id);
            ids.release(id);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut ids = SctpStreamIds::new(3);
        for expected in 0..3 {
            assert_eq!(ids.allocate().unwrap(), expected);
        }
        assert!(matches!(ids.allocate(), Err(Error::NoSctpStreamId)));
        assert_eq!(ids.in_use(), 3);

        ids.release(1);
        assert_eq!(ids.allocate().unwrap(), 1);
    }

    #[test]
    fn released_slot_waits_for_cursor() {
        let mut ids = SctpStreamIds::new(4);
        let first = ids.allocate().unwrap();
        ids.allocate().unwrap();
        ids.release(first);

        assert_eq!(ids.allocate().unwrap(), 2);
        assert_eq!(ids.allocate().unwrap(), 3);
        assert_eq!(ids.allocate().unwrap(), 0);
        assert!(!ids.is_used(42));
    }

    #[test]
    fn zero_streams_never_allocates() {
        let mut ids = SctpStreamIds::new(0);
        assert_eq!(ids.capacity(), 0);
        assert!(ids.allocate().is_err());
    }
}
