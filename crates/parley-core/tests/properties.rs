//! Property tests over sessions and the wire format.

mod common;

use common::{establish, Party};
use parley_core::{CiphertextMessage, GroupCipher, GroupSessionBuilder, SenderKeyMessage, SenderKeyName};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_plaintext_survives_the_wire(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let alice = Party::new("alice");
        let bob = Party::new("bob");
        establish(&alice, &bob);

        let bytes = alice.cipher_for(&bob).encrypt(&plaintext).unwrap().to_bytes().unwrap();
        let decrypted = bob.cipher_for(&alice).decrypt_bytes(&bytes).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn prop_any_delivery_order(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
        let alice = Party::new("alice");
        let bob = Party::new("bob");
        establish(&alice, &bob);

        let cipher = alice.cipher_for(&bob);
        let messages: Vec<_> = (0..8)
            .map(|i| cipher.encrypt(&[i as u8]).unwrap())
            .collect();

        let receiving = bob.cipher_for(&alice);
        for index in order {
            prop_assert_eq!(receiving.decrypt(&messages[index]).unwrap(), vec![index as u8]);
        }
    }

    #[test]
    fn prop_group_any_delivery_order(order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()) {
        let charlie = Party::new("charlie");
        let alpha = Party::new("alpha");
        let name = SenderKeyName::new("g", charlie.address.clone());
        let distribution = GroupSessionBuilder::new(&charlie.sender_keys).create(&name).unwrap();
        GroupSessionBuilder::new(&alpha.sender_keys).process(&name, &distribution).unwrap();

        let cipher = GroupCipher::new(&charlie.sender_keys, name.clone());
        let messages: Vec<_> = (0..8)
            .map(|i| cipher.encrypt(&[i as u8]).unwrap())
            .collect();

        let receiving = GroupCipher::new(&alpha.sender_keys, name);
        for index in order {
            prop_assert_eq!(receiving.decrypt(&messages[index]).unwrap(), vec![index as u8]);
        }
    }

    #[test]
    fn prop_arbitrary_frames_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = CiphertextMessage::from_bytes(&bytes);
        let _ = SenderKeyMessage::from_bytes(&bytes);
    }
}
