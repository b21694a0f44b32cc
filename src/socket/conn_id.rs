/// Size of the module's `<connectID>` space.
pub const CONN_ID_NUM: u8 = 5;
/// Raw value reserved for "no connection".
pub const CONN_ID_INVALID: u8 = CONN_ID_NUM;

/// Protocol level connection identifier, `0..CONN_ID_NUM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnId(u8);

impl ConnId {
    pub const fn new(raw: u8) -> Option<Self> {
        if raw < CONN_ID_NUM {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// First-fit bitmap allocator over the connection identifier space.
///
/// Ids are either picked locally (`alloc`) or learned from a notification
/// (`accept`), and returned with `free` on teardown. Callers hold the
/// registry lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnIdAllocator {
    bitmap: u8,
}

impl ConnIdAllocator {
    const MASK: u8 = (1 << CONN_ID_NUM) - 1;

    pub const fn new() -> Self {
        Self { bitmap: 0 }
    }

    /// Lowest free id, marked as in use.
    pub fn alloc(&mut self) -> Option<ConnId> {
        let free = !self.bitmap & Self::MASK;
        if free == 0 {
            return None;
        }
        let id = free.trailing_zeros() as u8;
        self.bitmap |= 1 << id;
        Some(ConnId(id))
    }

    pub fn free(&mut self, id: ConnId) {
        self.bitmap &= !(1 << id.0);
    }

    pub fn accept(&mut self, id: ConnId) {
        self.bitmap |= 1 << id.0;
    }

    pub fn is_allocated(&self, id: ConnId) -> bool {
        self.bitmap & (1 << id.0) != 0
    }

    pub fn reset(&mut self) {
        self.bitmap = 0;
    }

    pub fn bits(&self) -> u8 {
        self.bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit() {
        let mut ids = ConnIdAllocator::new();
        for expected in 0..CONN_ID_NUM {
            assert_eq!(ids.alloc(), ConnId::new(expected));
        }
        assert_eq!(ids.alloc(), None);

        ids.free(ConnId(3));
        ids.free(ConnId(1));
        assert_eq!(ids.alloc(), Some(ConnId(1)));
        assert_eq!(ids.alloc(), Some(ConnId(3)));
    }

    #[test]
    fn accepted_ids_are_skipped() {
        let mut ids = ConnIdAllocator::new();
        ids.accept(ConnId(0));
        ids.accept(ConnId(2));
        assert_eq!(ids.alloc(), Some(ConnId(1)));
        assert_eq!(ids.alloc(), Some(ConnId(3)));
        assert_eq!(ids.bits(), 0b1111);

        ids.reset();
        assert!(!ids.is_allocated(ConnId(0)));
    }

    #[test]
    fn invalid_sentinel() {
        assert_eq!(ConnId::new(CONN_ID_INVALID), None);
        assert_eq!(ConnId::new(4).map(ConnId::raw), Some(4));
    }
}
