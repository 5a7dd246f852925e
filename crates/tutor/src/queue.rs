use nimbus_domain::RawInput;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::warn;

/// Producer half, owned by the input callback.
pub struct InputSender {
    producer: HeapProducer<RawInput>,
}

impl InputSender {
    /// Queues `input`; returns `false` and drops it when the queue is full.
    pub fn send(&mut self, input: RawInput) -> bool {
        match self.producer.push(input) {
            Ok(()) => true,
            Err(dropped) => {
                warn!(note = ?dropped.note, "input queue full, dropping input");
                false
            }
        }
    }
}

/// Consumer half, drained once per tick by the polling loop.
pub struct InputReceiver {
    consumer: HeapConsumer<RawInput>,
}

impl InputReceiver {
    pub fn try_recv(&mut self) -> Option<RawInput> {
        self.consumer.pop()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

/// Single-producer, single-consumer hand-off between the input source and the
/// polling loop.
pub fn input_queue(capacity: usize) -> (InputSender, InputReceiver) {
    let (producer, consumer) = HeapRb::<RawInput>::new(capacity.max(1)).split();
    (InputSender { producer }, InputReceiver { consumer })
}
