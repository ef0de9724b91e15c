//! Seqno-ack latching and dispatch.
//!
//! The monitor never calls the ack sink while holding its state lock: an
//! advancement latches the seqno under the state lock and a later flush,
//! taken on the latch's own mutex, performs the send. Coalescing in the
//! latch means at most one send per advancement burst, and the labelled
//! monotonic traps any attempt to ack backwards.

use std::sync::Mutex;

use crate::core::{Monotonic, MonotonicViolation, PartitionId, SeqNo};

/// A seqno acknowledgement bound for the active replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqnoAck {
    pub partition: PartitionId,
    pub prepared_seqno: SeqNo,
}

/// Where acks go. The owning partition supplies the transport.
pub trait SeqnoAckSink: Send + Sync {
    fn send_seqno_ack(&self, ack: SeqnoAck);
}

/// Crossbeam-channel sink used by the partition runtime and tests.
pub struct ChannelAckSink {
    tx: crossbeam::channel::Sender<SeqnoAck>,
}

impl ChannelAckSink {
    pub fn unbounded() -> (Self, crossbeam::channel::Receiver<SeqnoAck>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Self { tx }, rx)
    }
}

impl SeqnoAckSink for ChannelAckSink {
    fn send_seqno_ack(&self, ack: SeqnoAck) {
        if self.tx.send(ack).is_err() {
            tracing::warn!(
                partition = %ack.partition,
                seqno = %ack.prepared_seqno,
                "ack receiver disconnected, dropping seqno ack"
            );
        }
    }
}

#[derive(Debug)]
struct LatchState {
    pending: SeqNo,
    last_acked: Monotonic<SeqNo>,
}

/// Latched next-seqno-to-ack. Zero means nothing pending.
#[derive(Debug)]
pub struct SeqnoAckLatch {
    partition: PartitionId,
    inner: Mutex<LatchState>,
}

impl SeqnoAckLatch {
    pub fn new(partition: PartitionId) -> Self {
        Self {
            partition,
            inner: Mutex::new(LatchState {
                pending: SeqNo::ZERO,
                last_acked: Monotonic::with_label(
                    format!("pdm({partition}).last_acked_seqno"),
                    SeqNo::ZERO,
                ),
            }),
        }
    }

    /// Latches `new_hps` when an advancement moved the watermark. Called
    /// with the state lock still held; the latch mutex nests inside it.
    pub fn store(&self, prev_hps: SeqNo, new_hps: SeqNo) {
        if new_hps == prev_hps {
            return;
        }
        let mut latch = self.inner.lock().expect("seqno ack latch poisoned");
        if latch.pending < new_hps {
            latch.pending = new_hps;
        }
    }

    /// Sends the latched seqno, if any. Called after the state lock is
    /// released. Holding the latch lock across the send serialises racing
    /// flushers, so acks leave in seqno order.
    pub fn flush(&self, sink: &dyn SeqnoAckSink) -> Result<(), MonotonicViolation> {
        let mut latch = self.inner.lock().expect("seqno ack latch poisoned");
        let pending = latch.pending;
        latch.pending = SeqNo::ZERO;
        if pending.is_zero() {
            return Ok(());
        }
        latch.last_acked.try_assign(pending)?;
        sink.send_seqno_ack(SeqnoAck {
            partition: self.partition,
            prepared_seqno: pending,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latch() -> SeqnoAckLatch {
        SeqnoAckLatch::new(PartitionId::new(1))
    }

    #[test]
    fn unchanged_hps_latches_nothing() {
        let latch = latch();
        let (sink, rx) = ChannelAckSink::unbounded();
        latch.store(SeqNo::new(5), SeqNo::new(5));
        latch.flush(&sink).expect("flush");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn bursts_coalesce_into_one_ack() {
        let latch = latch();
        let (sink, rx) = ChannelAckSink::unbounded();
        latch.store(SeqNo::ZERO, SeqNo::new(5));
        latch.store(SeqNo::new(5), SeqNo::new(9));
        latch.flush(&sink).expect("flush");

        let ack = rx.try_recv().expect("one ack");
        assert_eq!(ack.prepared_seqno, SeqNo::new(9));
        assert!(rx.try_recv().is_err());

        // A second flush with nothing pending sends nothing.
        latch.flush(&sink).expect("flush");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn acks_must_strictly_increase() {
        let latch = latch();
        let (sink, rx) = ChannelAckSink::unbounded();
        latch.store(SeqNo::ZERO, SeqNo::new(9));
        latch.flush(&sink).expect("flush");
        assert_eq!(rx.try_recv().expect("ack").prepared_seqno, SeqNo::new(9));

        latch.store(SeqNo::ZERO, SeqNo::new(4));
        let err = latch.flush(&sink).unwrap_err();
        assert_eq!(err.current, 9);
        assert_eq!(err.attempted, 4);
        assert!(rx.try_recv().is_err());
    }
}
