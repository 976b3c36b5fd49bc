use log::{debug, warn};
use shared::{format_chat_line, strip_line_endings};

use crate::error::RelayError;
use crate::relay::Relay;

impl Relay {
    /// Turns pending inbound messages into relay-queue entries.
    ///
    /// Clients are visited in admission order, and each message goes through
    /// the abuse limiter on its own. A throttled message is answered with the
    /// throttle notice to its sender only. A banned sender is evicted without
    /// a word and the rest of its messages are discarded. Messages that are
    /// empty once line endings are stripped are skipped before the limiter
    /// sees them.
    ///
    /// Returns the number of chat lines queued.
    pub fn ingest(&mut self) -> usize {
        let mut relayed = 0;

        for id in self.registry.ids() {
            let Some(messages) = self.inbox.remove(&id) else {
                continue;
            };
            let Some((name, addr)) = self
                .registry
                .get(id)
                .map(|client| (client.name.clone(), client.addr))
            else {
                continue;
            };

            for message in messages {
                let text = strip_line_endings(&message);
                if text.is_empty() {
                    continue;
                }

                match self.limiter.check(id, addr.ip()) {
                    Ok(()) => {
                        let line = format_chat_line(&name, &text);
                        debug!("{}", line);
                        self.queue.push_back(line);
                        relayed += 1;
                    }
                    Err(e @ RelayError::RateLimited { .. }) => {
                        warn!("Throttling {}: {}", name, e);
                        if let Some(client) = self.registry.get(id) {
                            if let Err(e) = client.send(self.throttle_notice.clone()) {
                                warn!("{}", e);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Dropping {}: {}", name, e);
                        self.evict(id, "banned");
                        break;
                    }
                }
            }
        }

        relayed
    }
}
