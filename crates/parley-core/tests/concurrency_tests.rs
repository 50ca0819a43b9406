//! Shared-store use from several threads.

mod common;

use common::{counter, establish, Party};
use parley_core::{
    Error, GroupCipher, GroupSessionBuilder, PreKeyStore, SenderKeyName, SessionCipher,
};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const PER_THREAD: usize = 25;

#[test]
fn test_concurrent_encrypts_get_unique_counters() {
    let alice = Arc::new(Party::new("alice"));
    let bob = Party::new("bob");
    establish(&alice, &bob);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let alice = Arc::clone(&alice);
            let remote = bob.address.clone();
            thread::spawn(move || {
                let cipher = SessionCipher::new(&alice.store, remote);
                (0..PER_THREAD)
                    .map(|i| {
                        let text = format!("{}:{}", t, i);
                        let message = cipher.encrypt(text.as_bytes()).expect("encrypt");
                        (text, message)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut messages = Vec::new();
    for handle in handles {
        messages.extend(handle.join().expect("thread panicked"));
    }

    let counters: HashSet<u32> = messages.iter().map(|(_, m)| counter(m)).collect();
    assert_eq!(counters.len(), THREADS * PER_THREAD);

    // Everything decrypts exactly once, in whatever order it was produced
    let receiving = bob.cipher_for(&alice);
    for (text, message) in &messages {
        assert_eq!(receiving.decrypt(message).expect("decrypt"), text.as_bytes());
    }
}

#[test]
fn test_concurrent_peers_do_not_block_each_other() {
    let hub = Arc::new(Party::new("hub"));
    let peers: Vec<Party> = (0..4).map(|i| Party::new(&format!("peer{}", i))).collect();
    for peer in &peers {
        establish(&hub, peer);
    }

    let handles: Vec<_> = peers
        .iter()
        .map(|peer| {
            let hub = Arc::clone(&hub);
            let remote = peer.address.clone();
            thread::spawn(move || {
                let cipher = SessionCipher::new(&hub.store, remote);
                (0..PER_THREAD)
                    .map(|_| cipher.encrypt(b"fan out").expect("encrypt"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (peer, handle) in peers.iter().zip(handles) {
        let receiving = peer.cipher_for(&hub);
        for message in handle.join().expect("thread panicked") {
            assert_eq!(receiving.decrypt(&message).expect("decrypt"), b"fan out");
        }
    }
}

#[test]
fn test_concurrent_group_encrypts() {
    let charlie = Arc::new(Party::new("charlie"));
    let alpha = Party::new("alpha");
    let name = SenderKeyName::new("busy", charlie.address.clone());

    let distribution = GroupSessionBuilder::new(&charlie.sender_keys)
        .create(&name)
        .expect("create");
    GroupSessionBuilder::new(&alpha.sender_keys)
        .process(&name, &distribution)
        .expect("process");

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let charlie = Arc::clone(&charlie);
            let name = name.clone();
            thread::spawn(move || {
                let cipher = GroupCipher::new(&charlie.sender_keys, name);
                (0..PER_THREAD)
                    .map(|_| cipher.encrypt(b"busy").expect("encrypt"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut messages = Vec::new();
    for handle in handles {
        messages.extend(handle.join().expect("thread panicked"));
    }

    let iterations: HashSet<u32> = messages.iter().map(|m| m.iteration).collect();
    assert_eq!(iterations.len(), THREADS * PER_THREAD);

    let receiving = GroupCipher::new(&alpha.sender_keys, name);
    for message in &messages {
        assert_eq!(receiving.decrypt(message).expect("decrypt"), b"busy");
    }
}

/// Two initiators racing on one published one-time prekey: exactly one
/// session is derived from it.
#[test]
fn test_one_time_pre_key_consumed_once_across_peers() {
    for _ in 0..20 {
        let bob = Party::new("bob");
        let alice = Party::new("alice");
        let carol = Party::new("carol");
        let bundle = bob.publish(Some(77));

        let mut messages = Vec::new();
        for initiator in [&alice, &carol] {
            initiator
                .builder_for(&bob)
                .process_pre_key_bundle(&bundle)
                .expect("process bundle");
            let text = format!("from {}", initiator.address.name());
            let message = initiator.cipher_for(&bob).encrypt(text.as_bytes()).expect("encrypt");
            messages.push((initiator.address.clone(), message));
        }

        let start = Barrier::new(messages.len());
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = messages
                .iter()
                .map(|(sender, message)| {
                    let bob = &bob;
                    let start = &start;
                    scope.spawn(move || {
                        let cipher = SessionCipher::new(&bob.store, sender.clone());
                        start.wait();
                        cipher.decrypt(message)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread panicked"))
                .collect()
        });

        let accepted = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(accepted, 1, "prekey 77 must back exactly one session");
        assert!(results
            .iter()
            .any(|result| matches!(result, Err(Error::StaleKeyReference(77)))));
        assert!(!bob.store.contains_pre_key(77).expect("lookup"));
    }
}
