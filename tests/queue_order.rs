//! Per-sender FIFO ordering under concurrent producers.

use std::any::Any;
use std::sync::Arc;

use harpoon_core::{Event, EventLoop, EventRef, EventType, Flow, Result, Subscription};
use proptest::prelude::*;
use tokio::sync::mpsc;

#[derive(Debug)]
struct Numbered {
    sender: usize,
    seq: usize,
}

impl Event for Numbered {
    fn event_type(&self) -> EventType {
        EventType::Extension(1)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn run(batches: Vec<usize>) -> Vec<(usize, usize)> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let total: usize = batches.iter().sum();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut consumer = EventLoop::spawn(
            "consumer",
            Subscription::new([EventType::Extension(1)], []),
            move |event: EventRef| -> Result<Flow> {
                let Some(numbered) = event.downcast_ref::<Numbered>() else {
                    return Ok(Flow::Stop);
                };
                let _ = tx.send((numbered.sender, numbered.seq));
                Ok(Flow::Continue)
            },
        );

        let producers: Vec<_> = batches
            .into_iter()
            .enumerate()
            .map(|(sender, count)| {
                let queue = consumer.queue().clone();
                tokio::spawn(async move {
                    for seq in 0..count {
                        queue
                            .send_event(Arc::new(Numbered { sender, seq }))
                            .unwrap();
                        if seq % 7 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let mut seen = Vec::with_capacity(total);
        while seen.len() < total {
            seen.push(rx.recv().await.unwrap());
        }

        consumer
            .queue()
            .send_event(Arc::new(harpoon_core::events::Quit))
            .unwrap();
        consumer.join().await.unwrap();
        seen
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_each_sender_order_is_preserved(batches in prop::collection::vec(0usize..200, 1..6)) {
        let expected_total: usize = batches.iter().sum();
        let senders = batches.len();
        let seen = run(batches);

        prop_assert_eq!(seen.len(), expected_total);
        for sender in 0..senders {
            let order: Vec<usize> = seen
                .iter()
                .filter(|(s, _)| *s == sender)
                .map(|(_, seq)| *seq)
                .collect();
            let sorted: Vec<usize> = (0..order.len()).collect();
            prop_assert_eq!(order, sorted);
        }
    }
}
