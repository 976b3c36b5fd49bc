use log::debug;

use crate::registry::ClientId;
use crate::relay::Relay;

impl Relay {
    /// Notes that a client's socket reported end-of-stream or an error.
    ///
    /// Eviction waits for the next reap so it happens at a fixed point in
    /// the tick.
    pub fn mark_closed(&mut self, id: ClientId, reason: String) {
        if self.registry.get(id).is_some() {
            debug!("{} reported closed: {}", id, reason);
            self.closed.entry(id).or_insert(reason);
        }
    }

    /// Evicts every client whose connection is gone.
    ///
    /// A client counts as gone when its reader reported a close, or when its
    /// writer task has stopped. Each eviction queues a leave notice for the
    /// clients that remain. Returns the number of clients evicted.
    pub fn reap(&mut self) -> usize {
        let dead: Vec<(ClientId, String)> = self
            .registry
            .iter()
            .filter_map(|client| {
                if let Some(reason) = self.closed.get(&client.id) {
                    Some((client.id, reason.clone()))
                } else if client.is_closed() {
                    Some((client.id, "write side closed".to_string()))
                } else {
                    None
                }
            })
            .collect();

        self.closed.clear();

        let mut reaped = 0;
        for (id, reason) in dead {
            if self.evict(id, &reason).is_some() {
                reaped += 1;
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::ClientId;
    use crate::relay::tests::{join, test_relay};

    #[test]
    fn test_closed_client_is_evicted_and_announced() {
        let (mut relay, _) = test_relay();
        let a = join(&mut relay, "A", "127.0.0.1:5000");
        let mut b = join(&mut relay, "B", "127.0.0.2:5000");
        relay.tick();
        b.drain();

        relay.mark_closed(a.id, "connection closed by peer".into());
        let report = relay.tick();

        assert_eq!(report.reaped, 1);
        assert!(relay.registry().get(a.id).is_none());
        assert!(!relay.registry().contains_name("A"));
        assert_eq!(b.drain(), vec!["[SERVER] A has left the chat.\n"]);
    }

    #[test]
    fn test_writer_gone_counts_as_closed() {
        let (mut relay, _) = test_relay();
        let a = join(&mut relay, "A", "127.0.0.1:5000");
        let mut b = join(&mut relay, "B", "127.0.0.2:5000");
        drop(a.rx);

        assert_eq!(relay.reap(), 1);
        relay.broadcast();
        let lines = b.drain();
        assert_eq!(lines.last().unwrap(), "[SERVER] A has left the chat.\n");
    }

    #[test]
    fn test_evicted_client_gets_nothing_from_same_tick() {
        let (mut relay, _) = test_relay();
        let mut a = join(&mut relay, "A", "127.0.0.1:5000");
        let mut b = join(&mut relay, "B", "127.0.0.2:5000");
        relay.tick();
        a.drain();
        b.drain();

        relay.receive(b.id, vec!["still here".into()]);
        relay.mark_closed(a.id, "reset".into());
        relay.tick();

        assert!(a.drain().is_empty());
        assert_eq!(
            b.drain(),
            vec!["[SERVER] A has left the chat.\n", "B: still here\n"]
        );
    }

    #[test]
    fn test_mark_closed_ignores_unknown_clients() {
        let (mut relay, _) = test_relay();
        relay.mark_closed(ClientId::new(7), "gone".into());
        assert!(relay.closed.is_empty());
        assert_eq!(relay.reap(), 0);
    }

    #[test]
    fn test_healthy_clients_survive_reap() {
        let (mut relay, _) = test_relay();
        let _a = join(&mut relay, "A", "127.0.0.1:5000");
        let _b = join(&mut relay, "B", "127.0.0.2:5000");
        assert_eq!(relay.reap(), 0);
        assert_eq!(relay.registry().len(), 2);
    }
}
