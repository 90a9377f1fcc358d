use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::RwLock;

/// Bidirectional map between tunnel session ids and local UDP peer addresses.
///
/// Entries are created the first time a datagram arrives from an unseen peer
/// and are never expired: table size is bounded only by the number of
/// distinct peers observed over the engine's lifetime. Bounded memory would
/// require an eviction policy as a deliberate extension.
///
/// Reads may run concurrently with each other; writes are exclusive.
#[derive(Debug, Default)]
pub struct SessionTable {
    inner: RwLock<Maps>,
}

#[derive(Debug, Default)]
struct Maps {
    id_to_addr: HashMap<u64, SocketAddr>,
    addr_to_id: HashMap<SocketAddr, u64>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert both directions of the mapping.
    pub fn set(&self, id: u64, addr: SocketAddr) {
        let mut maps = self.inner.write();
        maps.id_to_addr.insert(id, addr);
        maps.addr_to_id.insert(addr, id);
    }

    /// Peer address recorded for `id`, if any.
    pub fn addr(&self, id: u64) -> Option<SocketAddr> {
        self.inner.read().id_to_addr.get(&id).copied()
    }

    /// Session id recorded for `addr`, if any.
    pub fn session_id(&self, addr: &SocketAddr) -> Option<u64> {
        self.inner.read().addr_to_id.get(addr).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().id_to_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::SessionTable;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn set_establishes_both_directions() {
        let table = SessionTable::new();
        table.set(42, addr(5000));

        assert_eq!(table.addr(42), Some(addr(5000)));
        assert_eq!(table.session_id(&addr(5000)), Some(42));
    }

    #[test]
    fn unknown_lookups_report_not_found() {
        let table = SessionTable::new();
        assert_eq!(table.addr(1), None);
        assert_eq!(table.session_id(&addr(9)), None);
    }

    #[test]
    fn reassigning_a_known_address_updates_both_directions() {
        let table = SessionTable::new();
        table.set(1, addr(5000));
        table.set(2, addr(5000));

        assert_eq!(table.session_id(&addr(5000)), Some(2));
        assert_eq!(table.addr(2), Some(addr(5000)));
    }

    #[test]
    fn concurrent_readers_and_writer() {
        use std::sync::Arc;

        let table = Arc::new(SessionTable::new());
        let writer = {
            let table = table.clone();
            std::thread::spawn(move || {
                for i in 0..1000u64 {
                    table.set(i, addr((i % 60_000) as u16 + 1));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for i in 0..1000u64 {
                        let _ = table.addr(i);
                    }
                })
            })
            .collect();

        writer.join().expect("writer panicked");
        for r in readers {
            r.join().expect("reader panicked");
        }
        assert_eq!(table.len(), 1000);
    }
}
