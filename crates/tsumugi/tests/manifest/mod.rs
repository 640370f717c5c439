use tsumugi::{
    error::ParseError,
    http::HttpClient,
    mpd::{self, QualityKey, TrackKind},
    pipeline::download_track,
    select, sequence,
};
use wiremock::MockServer;

use crate::{
    common::{fixture, manifest, mount_media, walk_boxes},
    AssertWrapper,
};

#[test]
fn test_parse_fixture() {
    let document = mpd::parse(&manifest("https://cdn.example.com")).assert_success();

    let ids: Vec<_> = document.videos().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["v720", "v1080", "v1080-alt"]);
    let ids: Vec<_> = document.audios().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["a64", "a128"]);
    assert!(document.representations().all(|r| r.fragment_count == 5));

    // v-broken has no BaseURL, the text track is ignored
    assert_eq!(document.diagnostics().len(), 1);
    assert!(document.diagnostics()[0]
        .context
        .ends_with("Representation[v-broken]"));

    let header = document.protection_header().assert_success();
    assert_eq!(&header[4..8], b"pssh");
}

#[test]
fn test_select_and_expand_fixture() {
    let document = mpd::parse(&manifest("https://cdn.example.com")).assert_success();
    let selection = select::select(&document).assert_success();

    // equal heights keep the first one
    assert_eq!(selection.video.id, "v1080");
    assert_eq!(
        selection.video.quality,
        QualityKey::Resolution {
            width: 1920,
            height: 1080
        }
    );
    assert_eq!(selection.audio.id, "a128");

    let plan = sequence::expand(selection.video).assert_success();
    assert_eq!(plan.kind, TrackKind::Video);
    assert_eq!(plan.len() as u64, selection.video.fragment_count + 1);
    assert_eq!(
        plan.urls[0].as_str(),
        "https://cdn.example.com/video/v1080/init.mp4"
    );
    assert_eq!(
        plan.urls[5].as_str(),
        "https://cdn.example.com/video/v1080/5.m4s"
    );
}

#[test]
fn test_prefixed_namespace() {
    let document = mpd::parse(&fixture("prefixed.mpd")).assert_success();
    assert_eq!(document.videos().len(), 1);
    assert_eq!(document.audios().len(), 1);
    assert!(document.protection_header().is_none());

    let video = &document.videos()[0];
    assert_eq!(video.fragment_count, 2);
    assert_eq!(document.diagnostics().len(), 1);
    assert!(document.diagnostics()[0].message.contains("oops"));

    let plan = sequence::expand(video).assert_success();
    assert_eq!(
        plan.urls[2].as_str(),
        "https://cdn.example.com/dash/chunk-0-00002.m4s"
    );

    let audio = sequence::expand(&document.audios()[0]).assert_success();
    assert_eq!(audio.len(), 1);
}

#[test]
fn test_empty_manifest() {
    assert_eq!(mpd::parse("").unwrap_err(), ParseError::Empty);
    mpd::parse("<MPD><Period></AdaptationSet></MPD>").assert_error();
}

#[tokio::test]
async fn test_fragments_rebuild_container() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_media(&server).await;

    let document = mpd::parse(&manifest(&server.uri()))?;
    let selection = select::select(&document)?;
    let plan = sequence::expand(selection.video)?;

    let dir = tempfile::tempdir()?;
    let output = dir.path().join("video.mp4");
    let download = download_track(&HttpClient::default(), &plan, &output).await?;
    assert!(download.is_complete());
    assert_eq!(download.total, 6);

    let data = tokio::fs::read(&output).await?;
    let boxes = walk_boxes(&data).assert_success();
    let mut expected = vec!["ftyp", "moov"];
    for _ in 0..5 {
        expected.extend(["moof", "mdat"]);
    }
    assert_eq!(boxes, expected);
    Ok(())
}
