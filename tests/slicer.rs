//! Slicing and reassembly over an in-memory connection.

mod common;

use std::sync::Arc;

use common::{WAIT, init_tracing};
use media_relay::core::constants::DEFAULT_SLICE_MTU;
use media_relay::net::MemoryConn;
use media_relay::slicer::{FrameRing, Slice, SliceConn, SliceOutcome, SlicerConfig};
use media_relay::PacketConn;
use proptest::prelude::*;
use tokio::sync::mpsc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn roundtrip(frame: &[u8]) -> Vec<u8> {
    let (a, b) = MemoryConn::pair(64);
    let sender = SliceConn::new(Arc::new(a), SlicerConfig::default());
    let receiver = SliceConn::new(Arc::new(b), SlicerConfig::default());

    let (out, mut frames) = mpsc::channel(4);
    let reader = tokio::spawn(async move { receiver.read_assembled(out).await });

    sender.start_send(frame).await.unwrap();
    let assembled = tokio::time::timeout(WAIT, frames.recv())
        .await
        .unwrap()
        .unwrap();

    drop(frames);
    reader.abort();
    assembled
}

/// Slice `frame` and capture the raw slices instead of delivering them.
async fn capture_slices(frame: &[u8]) -> Vec<Slice> {
    let (a, b) = MemoryConn::pair(64);
    let sender = SliceConn::new(Arc::new(a), SlicerConfig::default());
    sender.start_send(frame).await.unwrap();

    let count = frame.len().div_ceil(DEFAULT_SLICE_MTU);
    let mut buf = vec![0u8; 2 * DEFAULT_SLICE_MTU];
    let mut slices = Vec::with_capacity(count);
    for _ in 0..count {
        let n = b.recv(&mut buf).await.unwrap();
        slices.push(Slice::decode(&buf[..n], DEFAULT_SLICE_MTU).unwrap());
    }
    slices
}

fn frame_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test]
async fn test_5000_byte_frame() {
    init_tracing();
    let frame = frame_of(5000);

    let slices = capture_slices(&frame).await;
    let lens: Vec<u16> = slices.iter().map(|s| s.header.slice_len).collect();
    assert_eq!(lens, vec![1400, 1400, 1400, 800]);
    assert!(slices.iter().all(|s| s.header.slice_count == 4));

    assert_eq!(roundtrip(&frame).await, frame);
}

#[tokio::test]
async fn test_duplicate_slice_does_not_change_output() {
    let frame = frame_of(3000);
    let slices = capture_slices(&frame).await;

    let mut ring = FrameRing::new();
    assert_eq!(ring.accept(slices[0].clone()), SliceOutcome::Incomplete);
    assert_eq!(ring.accept(slices[0].clone()), SliceOutcome::Duplicate);
    let frame_id = slices[0].header.frame_id;
    assert_eq!(ring.get(frame_id).unwrap().slices_received(), 1);

    assert_eq!(ring.accept(slices[1].clone()), SliceOutcome::Incomplete);
    assert_eq!(ring.accept(slices[2].clone()), SliceOutcome::Complete(frame));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_roundtrip_any_length(frame in proptest::collection::vec(any::<u8>(), 1..=10 * DEFAULT_SLICE_MTU)) {
        let assembled = runtime().block_on(roundtrip(&frame));
        prop_assert_eq!(assembled, frame);
    }

    #[test]
    fn prop_5000_bytes_any_arrival_order(order in Just(vec![0usize, 1, 2, 3]).prop_shuffle()) {
        let frame = frame_of(5000);
        let slices = runtime().block_on(capture_slices(&frame));

        let mut ring = FrameRing::new();
        let mut assembled = None;
        for (step, &index) in order.iter().enumerate() {
            match ring.accept(slices[index].clone()) {
                SliceOutcome::Complete(data) => {
                    prop_assert_eq!(step, 3);
                    assembled = Some(data);
                }
                outcome => {
                    prop_assert_eq!(outcome, SliceOutcome::Incomplete);
                }
            }
        }
        prop_assert_eq!(assembled, Some(frame));
    }
}
