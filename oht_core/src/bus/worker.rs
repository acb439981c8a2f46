//! Bus worker thread (§5): the one auxiliary thread the concurrency model
//! allows, used *only* to own the blocking serial link. [`BusTransport::
//! exchange`] applies up to `max_retries` exponential-backoff attempts
//! (§4.1) — worst case comfortably over a second — so running it on the
//! tick thread would blow the 10 ms tick deadline and, with it, the
//! bounded E-Stop response time (P4). The worker owns the transport and
//! runs `exchange` to completion off-thread; the tick thread submits at
//! most one outstanding request and polls for its response without ever
//! blocking, exactly the one suspension point (b) §5 names.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::thread::JoinHandle;

use super::modbus::Frame;
use super::transport::{BusTransport, SerialLink, TransportError};

struct Request {
    seq: u64,
    frame: Frame,
}

struct Response {
    seq: u64,
    result: Result<Frame, TransportError>,
}

/// Runs a [`BusTransport`] on a dedicated thread and exposes a non-blocking
/// submit/poll interface to the tick thread. Sequence numbers let `poll`
/// silently discard a response that arrives after its request was
/// [`abandon`](BusWorker::abandon)ed instead of misattributing it to
/// whatever request came after.
pub struct BusWorker {
    request_tx: Option<SyncSender<Request>>,
    response_rx: Receiver<Response>,
    next_seq: u64,
    pending_seq: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl BusWorker {
    /// Spawn the worker thread, moving `transport` onto it. The channel
    /// capacity of 1 matches §4.1's "at most one transaction in flight".
    pub fn spawn<L: SerialLink + 'static>(transport: BusTransport<L>) -> Self {
        let (request_tx, request_rx) = sync_channel::<Request>(1);
        let (response_tx, response_rx) = sync_channel::<Response>(1);

        let handle = std::thread::Builder::new()
            .name("oht-bus-worker".into())
            .spawn(move || Self::run(transport, request_rx, response_tx))
            .expect("failed to spawn bus worker thread");

        Self { request_tx: Some(request_tx), response_rx, next_seq: 0, pending_seq: None, handle: Some(handle) }
    }

    fn run<L: SerialLink>(mut transport: BusTransport<L>, request_rx: Receiver<Request>, response_tx: SyncSender<Response>) {
        while let Ok(Request { seq, frame }) = request_rx.recv() {
            let result = transport.exchange(&frame);
            if response_tx.send(Response { seq, result }).is_err() {
                break;
            }
        }
    }

    /// Submit a request if the worker is currently idle. Returns `false`
    /// without blocking if a transaction is already outstanding.
    pub fn submit(&mut self, frame: Frame) -> bool {
        if self.pending_seq.is_some() {
            return false;
        }
        let Some(tx) = self.request_tx.as_ref() else { return false };
        let seq = self.next_seq;
        if tx.try_send(Request { seq, frame }).is_ok() {
            self.next_seq = self.next_seq.wrapping_add(1);
            self.pending_seq = Some(seq);
            true
        } else {
            false
        }
    }

    /// Whether a request is currently outstanding.
    pub const fn is_busy(&self) -> bool {
        self.pending_seq.is_some()
    }

    /// Non-blocking poll for the outstanding request's response. Returns
    /// `None` if nothing has arrived yet (or there is nothing pending).
    pub fn poll(&mut self) -> Option<Result<Frame, TransportError>> {
        let expected = self.pending_seq?;
        match self.response_rx.try_recv() {
            Ok(Response { seq, result }) if seq == expected => {
                self.pending_seq = None;
                Some(result)
            }
            Ok(_stale) => None,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Give up on the outstanding request once its deadline has passed
    /// (§5: `issued_at + per_request_timeout`). The worker may still
    /// finish and deliver a response later; `poll` discards it by sequence
    /// number once a new request has taken over the `pending_seq` slot.
    pub fn abandon(&mut self) {
        self.pending_seq = None;
    }
}

impl Drop for BusWorker {
    fn drop(&mut self) {
        // Drop the sender first so the worker's blocking `recv()` returns
        // `Err` and the thread exits; only then join it.
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::modbus::{encode_read_registers, FunctionCode};
    use std::io;
    use std::time::{Duration, Instant};

    struct NullLink;
    impl SerialLink for NullLink {
        fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let reply = [0x03u8, 0x03, 0x02, 0x00, 0x64, 0xB9, 0xCB];
            buf[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }
        fn clear_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct StallingLink;
    impl SerialLink for StallingLink {
        fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
        fn clear_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample_request() -> Frame {
        encode_read_registers(FunctionCode::ReadHoldingRegisters, 0x03, 0, 1).unwrap()
    }

    #[test]
    fn submit_then_poll_round_trip() {
        let transport = BusTransport::with_link(NullLink, 50);
        let mut worker = BusWorker::spawn(transport);
        assert!(worker.submit(sample_request()));
        assert!(!worker.submit(sample_request()), "a second submit while busy must not block or succeed");

        let deadline = Instant::now() + Duration::from_secs(1);
        let mut result = None;
        while Instant::now() < deadline {
            if let Some(r) = worker.poll() {
                result = Some(r);
                break;
            }
        }
        assert!(result.expect("worker should have responded").is_ok());
        assert!(!worker.is_busy());
    }

    #[test]
    fn poll_never_blocks_while_worker_is_slow() {
        let transport = BusTransport::with_link(StallingLink, 1); // 1ms per-attempt timeout, 0 retries configured below
        let mut worker = BusWorker::spawn(transport);
        worker.submit(sample_request());

        let start = Instant::now();
        let polled = worker.poll();
        assert!(start.elapsed() < Duration::from_millis(5), "poll must return immediately");
        assert!(polled.is_none());
    }

    #[test]
    fn abandon_frees_the_slot_for_a_new_request() {
        let transport = BusTransport::with_link(StallingLink, 1);
        let mut worker = BusWorker::spawn(transport);
        worker.submit(sample_request());
        worker.abandon();
        assert!(!worker.is_busy());
        assert!(worker.submit(sample_request()));
    }
}
