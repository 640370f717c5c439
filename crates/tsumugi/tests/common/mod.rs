use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use tsumugi::{
    license::{Cdm, CdmKey, KeyType},
    mpd::ProtectionHeader,
    TsumugiError, TsumugiResult,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const CHALLENGE: &[u8] = b"license-challenge";

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {path}: {e}"))
}

/// The manifest fixture with its base URLs pointing at `base`.
pub fn manifest(base: &str) -> String {
    fixture("manifest.mpd").replace("{{BASE}}", base)
}

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + 8);
    data.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    data.extend_from_slice(kind);
    data.extend_from_slice(payload);
    data
}

pub fn init_segment(track: &str) -> Vec<u8> {
    let mut data = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso6mp41");
    data.extend(mp4_box(b"moov", format!("{track}-moov").as_bytes()));
    data
}

pub fn media_segment(track: &str, number: u64) -> Vec<u8> {
    let mut data = mp4_box(b"moof", format!("{track}-moof-{number}").as_bytes());
    data.extend(mp4_box(b"mdat", &vec![number as u8; number as usize * 16]));
    data
}

/// Walks top level boxes. Returns `None` unless the boxes cover the data
/// exactly.
pub fn walk_boxes(data: &[u8]) -> Option<Vec<String>> {
    let mut boxes = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let header = data.get(offset..offset + 8)?;
        let size = u32::from_be_bytes(header[..4].try_into().ok()?) as usize;
        if size < 8 {
            return None;
        }
        boxes.push(String::from_utf8_lossy(&header[4..8]).into_owned());
        offset += size;
    }
    (offset == data.len()).then_some(boxes)
}

/// Serves the manifest fixture and the fragments of the `v1080` and `a128`
/// representations.
pub async fn mount_media(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest(&server.uri())))
        .mount(server)
        .await;

    for (route, track) in [("/video/v1080", "video"), ("/audio/a128", "audio")] {
        Mock::given(method("GET"))
            .and(path(format!("{route}/init.mp4")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(init_segment(track)))
            .mount(server)
            .await;
        for number in 1..=5 {
            Mock::given(method("GET"))
                .and(path(format!("{route}/{number}.m4s")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_bytes(media_segment(track, number)),
                )
                .mount(server)
                .await;
        }
    }
}

/// In-memory CDM counting its sessions.
pub struct MockCdm {
    pub keys: Vec<CdmKey>,
    pub fail_challenge: bool,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub licenses: Mutex<Vec<Vec<u8>>>,
}

impl MockCdm {
    pub fn new(keys: Vec<CdmKey>) -> Self {
        Self {
            keys,
            fail_challenge: false,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            licenses: Mutex::new(Vec::new()),
        }
    }

    pub fn with_content_key() -> Self {
        Self::new(vec![
            CdmKey {
                kid: None,
                key: vec![0x00; 16],
                r#type: KeyType::Signing,
            },
            content_key(),
        ])
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn content_key() -> CdmKey {
    CdmKey {
        kid: Some("0123abcd000000000000000000000000".to_string()),
        key: vec![0x42; 16],
        r#type: KeyType::Content,
    }
}

impl Cdm for MockCdm {
    async fn open(&self) -> TsumugiResult<String> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(format!("session-{id}"))
    }

    async fn challenge(&self, _session: &str, header: &ProtectionHeader) -> TsumugiResult<Vec<u8>> {
        if self.fail_challenge {
            return Err(TsumugiError::CdmError("invalid init data".to_string()));
        }
        assert!(!header.is_empty());
        Ok(CHALLENGE.to_vec())
    }

    async fn parse_license(&self, _session: &str, license: &[u8]) -> TsumugiResult<()> {
        if let Ok(mut licenses) = self.licenses.lock() {
            licenses.push(license.to_vec());
        }
        Ok(())
    }

    async fn keys(&self, _session: &str) -> TsumugiResult<Vec<CdmKey>> {
        Ok(self.keys.clone())
    }

    async fn close(&self, _session: &str) -> TsumugiResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
