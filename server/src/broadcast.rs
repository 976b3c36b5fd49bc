use log::warn;

use crate::relay::Relay;

impl Relay {
    /// Drains the relay queue and writes every entry to every registered
    /// client, in queue order.
    ///
    /// Delivery is best effort. A client whose outbound queue is full or
    /// closed misses the line and everyone else still gets it; a closed
    /// client is picked up by the next reap. Returns the number of
    /// successful deliveries.
    pub fn broadcast(&mut self) -> usize {
        if self.queue.is_empty() {
            return 0;
        }

        let entries: Vec<String> = self.queue.drain(..).collect();
        let mut deliveries = 0;

        for entry in &entries {
            let line = format!("{entry}\n");
            for client in self.registry.iter() {
                match client.send(line.clone()) {
                    Ok(()) => deliveries += 1,
                    Err(e) => warn!("{}", e),
                }
            }
        }

        deliveries
    }
}
