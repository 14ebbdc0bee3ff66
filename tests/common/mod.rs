#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use depgit::context::Context;
use depgit::database::{Database, SqliteDatabase};
use depgit::model::{AccessRole, Repo, User};
use depgit::objects::types::ObjectType;
use depgit::serve::AppCore;
use depgit::sha::HashValue;
use depgit::storage::ObjectStorage;
use depgit::transaction::{Transaction, TransactionService};
use flate2::Compression;
use flate2::write::ZlibEncoder;

pub struct Fixture {
    pub core: AppCore,
    pub db: Arc<SqliteDatabase>,
    pub storage: Arc<ObjectStorage>,
    pub user: User,
    pub repo: Repo,
}

/// One user and one repository; the user gets a role per pattern.
pub async fn fixture(patterns: &[Option<&str>]) -> Fixture {
    let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let storage = Arc::new(ObjectStorage::memory());
    let ctx = Context::background();
    let user = User::new("release-engineer", "release@example.com");
    let repo = Repo::new("project");
    db.create_user(&ctx, &user).await.unwrap();
    db.create_repo(&ctx, &repo).await.unwrap();
    for pattern in patterns {
        let role = AccessRole::new(user.id, repo.id, *pattern);
        db.create_access_role(&ctx, &role).await.unwrap();
    }
    Fixture {
        core: AppCore::with_sqlite(db.clone(), storage.clone()),
        db,
        storage,
        user,
        repo,
    }
}

impl Fixture {
    pub fn transaction(&self, service: TransactionService, repo_name: &str) -> Transaction {
        Transaction::new(self.core.clone(), Context::background(), service, repo_name)
            .authenticated(self.user.clone())
            .unwrap()
    }

    /// Runs one session over an in-memory input and returns the exit status
    /// with everything the server wrote.
    pub async fn run(&self, service: TransactionService, repo_name: &str, input: &[u8]) -> (u32, Vec<u8>) {
        let mut transaction = self.transaction(service, repo_name);
        let mut reader = input;
        let mut output = Vec::new();
        let code = transaction.run(&mut reader, &mut output).await;
        (code, output)
    }
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One undeltified pack entry.
pub fn pack_entry(kind: ObjectType, content: &[u8]) -> Vec<u8> {
    let size = content.len();
    let mut out = Vec::new();
    let mut byte = (kind.to_u8() << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;
    while rest > 0 {
        out.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(byte);
    out.extend(zlib(content));
    out
}

pub fn pack_header(count: u32) -> Vec<u8> {
    let mut pack = b"PACK".to_vec();
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&count.to_be_bytes());
    pack
}

pub fn build_pack(objects: &[(ObjectType, &[u8])]) -> Vec<u8> {
    let mut pack = pack_header(objects.len() as u32);
    for (kind, content) in objects {
        pack.extend(pack_entry(*kind, content));
    }
    let trailer = HashValue::digest(&pack);
    pack.extend_from_slice(trailer.as_bytes());
    pack
}

pub fn blob_id(content: &[u8]) -> HashValue {
    HashValue::hash_object("blob", content)
}

pub fn pkt(payload: &[u8]) -> Vec<u8> {
    let mut out = format!("{:04x}", payload.len() + 4).into_bytes();
    out.extend_from_slice(payload);
    out
}

/// Command block followed by an optional pack. Capabilities ride on the
/// first command.
pub fn push_input(commands: &[(HashValue, HashValue, &str)], capabilities: &str, pack: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, (old, new, name)) in commands.iter().enumerate() {
        let line = if i == 0 {
            format!("{} {} {}\0{}\n", old, new, name, capabilities)
        } else {
            format!("{} {} {}\n", old, new, name)
        };
        out.extend(pkt(line.as_bytes()));
    }
    out.extend_from_slice(b"0000");
    if let Some(pack) = pack {
        out.extend_from_slice(pack);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkt {
    Data(Vec<u8>),
    Flush,
}

pub fn parse_pkts(mut data: &[u8]) -> Vec<Pkt> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let len = usize::from_str_radix(std::str::from_utf8(&data[..4]).unwrap(), 16).unwrap();
        if len == 0 {
            out.push(Pkt::Flush);
            data = &data[4..];
        } else {
            out.push(Pkt::Data(data[4..len].to_vec()));
            data = &data[len..];
        }
    }
    out
}

/// Text of each flush-terminated block. A trailing unterminated block is kept.
pub fn blocks(data: &[u8]) -> Vec<Vec<String>> {
    let mut out = vec![Vec::new()];
    for item in parse_pkts(data) {
        match item {
            Pkt::Flush => out.push(Vec::new()),
            Pkt::Data(payload) => out
                .last_mut()
                .unwrap()
                .push(String::from_utf8_lossy(&payload).into_owned()),
        }
    }
    if out.last().is_some_and(|b| b.is_empty()) {
        out.pop();
    }
    out
}

/// Splits side-band frames into (primary bytes, progress text).
pub fn demux_side_band(frames: &[Pkt]) -> (Vec<u8>, String) {
    let mut primary = Vec::new();
    let mut progress = String::new();
    for frame in frames {
        if let Pkt::Data(payload) = frame {
            match payload[0] {
                1 => primary.extend_from_slice(&payload[1..]),
                2 => progress.push_str(&String::from_utf8_lossy(&payload[1..])),
                band => panic!("unexpected band {}", band),
            }
        }
    }
    (primary, progress)
}
