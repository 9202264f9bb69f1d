// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crossbeam_channel::{bounded, select, tick, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Calls a closure on a fixed interval from a background thread.
///
/// Drives the resolver watchdog and the stream-cache sweep.
pub struct Heartbeat {
    interval: Duration,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: None,
            handle: None,
        }
    }

    pub fn start<F>(&mut self, mut beat: F) -> io::Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if self.handle.is_some() {
            return Ok(());
        }
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticker = tick(self.interval);
        let handle = thread::Builder::new()
            .name("tessera-heartbeat".to_string())
            .spawn(move || {
                log::debug!("Heartbeat: thread started");
                loop {
                    select! {
                        recv(ticker) -> _ => beat(),
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::debug!("Heartbeat: thread stopped");
            })?;
        self.stop = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        // Disconnecting the stop channel wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Heartbeat: thread panicked");
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn beats_until_stopped() {
        let beats = Arc::new(AtomicUsize::new(0));
        let counter = beats.clone();
        let mut heartbeat = Heartbeat::new(Duration::from_millis(5));
        heartbeat
            .start(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        thread::sleep(Duration::from_millis(100));
        heartbeat.stop();
        let after_stop = beats.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(beats.load(Ordering::SeqCst), after_stop);
    }
}
