//! Shared fixtures for the flow integration tests

use ledger_net::NodeEndpoint;
use ledger_types::{Command, OutputState, PartyKey, StateRef, TimeWindow, TransactionBody};
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Output carrying a little-endian amount, the contract payload used
/// throughout these tests
pub fn amount_output(amount: u64, participants: Vec<PartyKey>) -> OutputState {
    OutputState {
        data: amount.to_le_bytes().to_vec(),
        participants,
    }
}

pub fn amount_of(output: &OutputState) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&output.data[..8]);
    u64::from_le_bytes(bytes)
}

pub fn body(
    inputs: Vec<StateRef>,
    outputs: Vec<OutputState>,
    signers: Vec<PartyKey>,
    notary: Option<PartyKey>,
) -> TransactionBody {
    TransactionBody {
        inputs,
        outputs,
        commands: vec![Command {
            data: Vec::new(),
            signers,
        }],
        notary,
        time_window: None,
        attachments: Vec::new(),
    }
}

pub fn open_window(not_after: u64) -> TimeWindow {
    TimeWindow {
        not_before: None,
        not_after: Some(not_after),
    }
}

/// Poll until `cond` holds; panics after two seconds
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Drive a raw endpoint's demux so its connector sessions see replies;
/// inbound sessions are dropped unanswered
pub fn drive(mut endpoint: NodeEndpoint) {
    tokio::spawn(async move { while endpoint.accept().await.is_some() {} });
}
