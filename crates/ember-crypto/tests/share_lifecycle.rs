//! End-to-end share lifecycle: enrollment-shaped split, wrap, unwrap, and
//! account reassembly.

use ember_crypto::{
    combine, decrypt_share, derive_share, encrypt_share, recover_address_from_personal_sign,
    split, PrivateKeyAccount, Secret, Share, AUTH_SHARE_ID, DEVICE_SHARE_ID, RECOVERY_SHARE_ID,
};

#[test]
fn enrollment_shares_carry_their_ids() {
    let secret = Secret::generate();
    let shares = split(&secret);
    assert_eq!(shares.device.id(), DEVICE_SHARE_ID);
    assert_eq!(shares.auth.id(), AUTH_SHARE_ID);
    assert_eq!(shares.recovery.id(), RECOVERY_SHARE_ID);
}

#[test]
fn enrollment_then_recovery_yields_the_same_account() {
    // Enrollment: split and derive the signing account.
    let secret = Secret::from_bytes([
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
        0xee, 0xff,
    ])
    .unwrap();
    let enrolled = PrivateKeyAccount::from_secret(&secret).unwrap();
    let shares = split(&secret);

    // The recovery share goes to the server AES-wrapped; the ciphertext
    // must not leak the share text.
    let blob = encrypt_share(&shares.recovery, "hunter2").unwrap();
    assert!(!blob.contains(&shares.recovery.to_wire()));

    // Recovery on a new device: server returns (auth, blob); the code
    // unwraps, two shares rebuild the secret, and a fresh device share
    // comes off the recovered polynomial.
    let auth = Share::from_wire(&shares.auth.to_wire()).unwrap();
    let recovery = decrypt_share(&blob, "hunter2").unwrap();
    let rebuilt = combine(&auth, &recovery).unwrap();
    let recovered = PrivateKeyAccount::from_secret(&rebuilt).unwrap();
    assert_eq!(recovered.address(), enrolled.address());

    let new_device = derive_share(DEVICE_SHARE_ID, &auth, &recovery).unwrap();
    assert_eq!(new_device.to_wire(), shares.device.to_wire());
}

#[test]
fn recovered_account_signs_interchangeably_with_the_original() {
    let secret = Secret::generate();
    let original = PrivateKeyAccount::from_secret(&secret).unwrap();

    let shares = split(&secret);
    let rebuilt = combine(&shares.device, &shares.auth).unwrap();
    let recovered = PrivateKeyAccount::from_secret(&rebuilt).unwrap();

    let signature = recovered.personal_sign(b"proof of custody").unwrap();
    let signer = recover_address_from_personal_sign(b"proof of custody", &signature).unwrap();
    assert_eq!(signer, original.address());
}
