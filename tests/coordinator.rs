//! End-to-end scenarios exercising the coordinator API against a temporary headers directory.
//!
//! Heights stay small (tens, not the real 2016-header chunk stride) and every test header uses
//! the cheap blake2s PoW path with a deliberately easy target, so these are fast to construct
//! without real mining; a synthetic, generously sized checkpoint table is supplied so the
//! legacy retarget's checkpoint-table shortcut answers every height these tests touch without
//! needing a full 2016-header chunk on disk (see `target::legacy_target`'s doc comment on the
//! preserved height-as-index quirk).

use primitive_types::U256;
use tempfile::tempdir;
use xsh_headerstore::{
    checkpoints::{Checkpoint, CheckpointTable},
    coordinator::Coordinator,
    hash::Hash256,
    header::{target_to_bits, Header},
    pow,
    target::Network,
};

const BLAKE_TAG: u32 = 4 << 11;

fn easy_target() -> U256 {
    U256::MAX >> 8
}

fn checkpoint_table(entries: usize, target: U256) -> CheckpointTable {
    CheckpointTable::new(
        (0..entries)
            .map(|_| Checkpoint {
                hash: Hash256::ZERO,
                target,
                timestamp: 0,
            })
            .collect(),
    )
}

fn mine(height: u64, prev_hash: Hash256, timestamp: u32, target: U256) -> Header {
    let bits = target_to_bits(target);
    for nonce in 0..10_000u32 {
        let candidate = Header {
            version: BLAKE_TAG,
            prev_block_hash: prev_hash,
            merkle_root: Hash256::ZERO,
            timestamp,
            bits,
            nonce,
            height,
        };
        let value = pow::pow_hash_as_u256(pow::pow_hash_header(&candidate));
        if value < target {
            return candidate;
        }
    }
    panic!("failed to mine test header at height {height}");
}

fn build_headers(n: u64, target: U256) -> Vec<Header> {
    let mut headers = Vec::new();
    let mut prev = Hash256::ZERO;
    for height in 0..n {
        let h = mine(height, prev, 1_600_000_000 + height as u32 * 225, target);
        prev = pow::hash_header(&h);
        headers.push(h);
    }
    headers
}

fn hex_chunk(headers: &[Header]) -> String {
    let mut bytes = Vec::new();
    for h in headers {
        bytes.extend_from_slice(&h.serialize());
    }
    hex::encode(bytes)
}

#[test]
fn genesis_header_with_wrong_hash_does_not_connect() {
    let dir = tempdir().unwrap();
    let checkpoints = checkpoint_table(20, easy_target());
    let coordinator = Coordinator::with_checkpoints(dir.path().to_path_buf(), Network::Mainnet, checkpoints).unwrap();

    let bogus_genesis = mine(0, Hash256::ZERO, 1_600_000_000, easy_target());
    assert!(coordinator.can_connect(&bogus_genesis, true).is_none());
}

#[test]
fn small_chunk_connects_and_advances_height() {
    let dir = tempdir().unwrap();
    let checkpoints = checkpoint_table(20, easy_target());
    let coordinator = Coordinator::with_checkpoints(dir.path().to_path_buf(), Network::Mainnet, checkpoints).unwrap();

    let headers = build_headers(10, easy_target());
    let main = coordinator.main_chain();
    let ok = coordinator.connect_chunk(&main, 0, &hex_chunk(&headers));

    assert!(ok);
    assert_eq!(coordinator.height(), Some(9));
    for h in &headers {
        let stored = main.read_header(h.height, coordinator.fork_manager()).unwrap().unwrap();
        assert_eq!(stored, *h);
    }
}

#[test]
fn bad_bits_is_rejected_and_leaves_chain_untouched() {
    let dir = tempdir().unwrap();
    let checkpoints = checkpoint_table(20, easy_target());
    let coordinator = Coordinator::with_checkpoints(dir.path().to_path_buf(), Network::Mainnet, checkpoints).unwrap();

    let mut headers = build_headers(10, easy_target());
    headers[3].bits ^= 0x1;

    let main = coordinator.main_chain();
    let ok = coordinator.connect_chunk(&main, 0, &hex_chunk(&headers));

    assert!(!ok);
    assert_eq!(coordinator.height(), None);
}

#[test]
fn fork_overtaking_parent_triggers_swap() {
    let dir = tempdir().unwrap();
    let checkpoints = checkpoint_table(20, easy_target());
    let coordinator = Coordinator::with_checkpoints(dir.path().to_path_buf(), Network::Mainnet, checkpoints).unwrap();

    let main_headers = build_headers(6, easy_target()); // heights 0..=5
    let main = coordinator.main_chain();
    for h in &main_headers {
        main.save_header(h).unwrap();
    }
    assert_eq!(main.height(), Some(5));

    // Fork off height 2, then extend the fork two blocks past main's tip.
    let fork_parent_hash = pow::hash_header(&main_headers[2]);
    let fork_h3 = mine(3, fork_parent_hash, 1_700_000_000, easy_target());
    let fork = coordinator.fork(&main, &fork_h3).unwrap();

    let mut prev = pow::hash_header(&fork_h3);
    for height in 4..=7u64 {
        let h = mine(height, prev, 1_700_000_000 + height as u32 * 225, easy_target());
        prev = pow::hash_header(&h);
        fork.save_header(&h).unwrap();
        coordinator.fork_manager().swap_with_parent(fork.checkpoint()).unwrap();
    }

    let new_main = coordinator.main_chain();
    assert_eq!(new_main.height(), Some(7));
    assert_eq!(new_main.read_header(2, coordinator.fork_manager()).unwrap(), main_headers.get(2).cloned());
}
