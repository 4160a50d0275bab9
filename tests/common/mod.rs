#![allow(dead_code)]

use eskit::crypto::{content_iv, encrypt_cbc, sha1};
use eskit::es::Es;
use eskit::keys::KeySet;
use eskit::nand::{NandPaths, NandStore};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const TITLE_ID: u64 = 0x0001_0001_5241_4245;
pub const OTHER_TITLE_ID: u64 = 0x0001_0001_5241_4246;
pub const TITLE_KEY: [u8; 16] = [
    0x3a, 0x91, 0x07, 0xc2, 0x55, 0x18, 0xe0, 0x6d, 0x4f, 0xb3, 0x2c, 0x77, 0x90, 0x0e, 0xa1, 0x5b,
];
pub const TICKET_ID: u64 = 0x0001_2345_6789_abcd;

const TICKET_BODY: usize = 0x140;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh service rooted in a temporary NAND.
pub fn setup() -> (TempDir, Es) {
    setup_with_keys(KeySet::new())
}

pub fn setup_with_keys(keys: KeySet) -> (TempDir, Es) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let es = Es::new(keys, NandStore::new(NandPaths::new(dir.path())));
    (dir, es)
}

pub fn paths(dir: &TempDir) -> NandPaths {
    NandPaths::new(dir.path())
}

/// Ticket image carrying `title_key_field` verbatim.
pub fn raw_ticket(title_id: u64, device_id: u32, title_key_field: [u8; 16]) -> Vec<u8> {
    let mut bytes = vec![0u8; TICKET_BODY + 0x164];
    bytes[..4].copy_from_slice(&0x10001u32.to_be_bytes());
    let body = &mut bytes[TICKET_BODY..];
    body[0x7F..0x8F].copy_from_slice(&title_key_field);
    body[0x90..0x98].copy_from_slice(&TICKET_ID.to_be_bytes());
    body[0x98..0x9C].copy_from_slice(&device_id.to_be_bytes());
    body[0x9C..0xA4].copy_from_slice(&title_id.to_be_bytes());
    bytes
}

/// `title_key` wrapped with the retail common key.
pub fn wrap_title_key(title_id: u64, title_key: &[u8; 16]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id.to_be_bytes());
    encrypt_cbc(&KeySet::new().common_key, &iv, title_key)
        .unwrap()
        .try_into()
        .unwrap()
}

/// An unbound ticket for `title_id`.
pub fn ticket(title_id: u64, title_key: &[u8; 16]) -> Vec<u8> {
    raw_ticket(title_id, 0, wrap_title_key(title_id, title_key))
}

/// A ticket bound to `device_id`, personalised with `secret`.
pub fn personalised_ticket(
    title_id: u64,
    device_id: u32,
    secret: &[u8; 16],
    title_key: &[u8; 16],
) -> Vec<u8> {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&TICKET_ID.to_be_bytes());
    let personal = encrypt_cbc(secret, &iv, &wrap_title_key(title_id, title_key)).unwrap();
    raw_ticket(title_id, device_id, personal.try_into().unwrap())
}

#[derive(Debug, Clone)]
pub struct TestContent {
    pub id: u32,
    pub index: u16,
    pub shared: bool,
    pub data: Vec<u8>,
}

impl TestContent {
    pub fn private(id: u32, index: u16, data: Vec<u8>) -> Self {
        Self {
            id,
            index,
            shared: false,
            data,
        }
    }

    pub fn shared(id: u32, index: u16, data: Vec<u8>) -> Self {
        Self {
            id,
            index,
            shared: true,
            data,
        }
    }

    /// Ciphertext as a WAD would carry it: zero padded to the AES block size.
    pub fn encrypted(&self, title_key: &[u8; 16]) -> Vec<u8> {
        let mut padded = self.data.clone();
        padded.resize(self.data.len().div_ceil(16) * 16, 0);
        encrypt_cbc(title_key, &content_iv(self.index), &padded).unwrap()
    }
}

/// Deterministic filler data.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

pub fn raw_tmd(title_id: u64, contents: &[TestContent]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x1E4];
    bytes[..4].copy_from_slice(&0x10001u32.to_be_bytes());
    bytes[0x184..0x18C].copy_from_slice(&0x0000_0001_0000_0024u64.to_be_bytes());
    bytes[0x18C..0x194].copy_from_slice(&title_id.to_be_bytes());
    bytes[0x198..0x19A].copy_from_slice(b"01");
    bytes[0x1DE..0x1E0].copy_from_slice(&(contents.len() as u16).to_be_bytes());
    for content in contents {
        let content_type: u16 = if content.shared { 0x8001 } else { 0x0001 };
        bytes.extend_from_slice(&content.id.to_be_bytes());
        bytes.extend_from_slice(&content.index.to_be_bytes());
        bytes.extend_from_slice(&content_type.to_be_bytes());
        bytes.extend_from_slice(&(content.data.len() as u64).to_be_bytes());
        bytes.extend_from_slice(&sha1(&content.data));
    }
    bytes
}

/// Transfer one content through an open import.
pub fn transfer(
    es: &mut Es,
    title_id: u64,
    content: &TestContent,
    title_key: &[u8; 16],
) -> eskit::Result<()> {
    let fd = es.add_content_start(title_id, content.id)?;
    for chunk in content.encrypted(title_key).chunks(0x40) {
        es.add_content_data(fd, chunk)?;
    }
    es.add_content_finish(fd)
}

/// Full import: ticket, TMD, every content, finish.
pub fn install(es: &mut Es, title_id: u64, contents: &[TestContent]) {
    es.add_ticket(ticket(title_id, &TITLE_KEY)).unwrap();
    es.add_title_start(raw_tmd(title_id, contents)).unwrap();
    for content in contents {
        transfer(es, title_id, content, &TITLE_KEY).unwrap();
    }
    es.add_title_finish().unwrap();
}
