//! Rate-paced trigger events.
//!
//! A [`Generator`] emits exactly `count` events on an unbuffered channel from
//! its own thread, then closes the channel. With a non-zero `rate` it waits
//! one `1s / rate` tick before each event; with a rate of zero it emits as
//! fast as the consumer receives.

use crate::context::Context;
use crate::err::{Error, Result};
use crossbeam_channel::{bounded, never, select, tick, Receiver};
use log::debug;
use std::thread;
use std::time::Duration;

/// Generator
#[derive(Debug, Clone)]
pub struct Generator {
    count: u64,
    rate: u32,
    ctx: Option<Context>,
}

impl Generator {
    /// Emit `count` events, at most `rate` per second. Zero disables pacing.
    pub fn new(count: u64, rate: u32) -> Self {
        Generator {
            count,
            rate,
            ctx: None,
        }
    }

    /// Stop early, closing the channel, once `ctx` is done.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Time between events, `None` when unpaced.
    pub fn interval(&self) -> Option<Duration> {
        if self.rate == 0 {
            None
        } else {
            Some(Duration::from_secs(1) / self.rate)
        }
    }

    /// Start emitting. Each event carries its sequence number, `0..count`.
    ///
    /// The thread exits once every event is delivered, the context is done,
    /// or the receiver is dropped.
    pub fn spawn(self) -> Result<Receiver<u64>> {
        let (tx, rx) = bounded(0);
        let interval = self.interval();

        thread::Builder::new()
            .name("volley-generator".to_owned())
            .spawn(move || {
                let ticker = interval.map(tick).unwrap_or_else(never);
                let (done, expiry) = match &self.ctx {
                    Some(ctx) => (ctx.done().clone(), ctx.expiry()),
                    None => (never(), never()),
                };

                for seq in 0..self.count {
                    if self.ctx.as_ref().map_or(false, Context::is_done) {
                        debug!("generator stopped by context after {} events", seq);
                        return;
                    }

                    if interval.is_some() {
                        let ticked = select! {
                            recv(ticker) -> _ => true,
                            recv(done) -> _ => false,
                            recv(expiry) -> _ => false,
                        };
                        if !ticked {
                            debug!("generator stopped by context after {} events", seq);
                            return;
                        }
                    }

                    let sent = select! {
                        send(tx, seq) -> res => res.is_ok(),
                        recv(done) -> _ => false,
                        recv(expiry) -> _ => false,
                    };
                    if !sent {
                        debug!("generator stopped after {} events", seq);
                        return;
                    }
                }
                debug!("generator emitted {} events", self.count);
            })
            .map_err(Error::Spawn)?;

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_follows_rate() {
        assert_eq!(Generator::new(1, 0).interval(), None);
        assert_eq!(
            Generator::new(1, 4).interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn zero_count_closes_immediately() {
        let rx = Generator::new(0, 0).spawn().unwrap();
        assert!(rx.recv().is_err());
    }

    #[test]
    fn events_carry_sequence_numbers() {
        let rx = Generator::new(4, 0).spawn().unwrap();
        let seqs: Vec<u64> = rx.iter().collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }
}
