use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::Path,
    sync::Mutex,
};

use serde_json::json;
use tsumugi::{
    catalog::{EpisodeJob, Playback, PlaybackSource, SubtitleTrack},
    error::ProcessError,
    license::{ContentKey, LicenseExchange, LicenseServer},
    pipeline::{EpisodeOutcome, MediaToolkit, Stage},
    AcquisitionPipeline, TsumugiError, TsumugiResult,
};
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{
    common::{mount_media, walk_boxes, MockCdm},
    AssertWrapper,
};

struct StaticSource {
    playbacks: HashMap<String, Playback>,
}

impl PlaybackSource for StaticSource {
    async fn playback(&self, guid: &str) -> TsumugiResult<Playback> {
        self.playbacks
            .get(guid)
            .cloned()
            .ok_or_else(|| TsumugiError::PlaybackUnavailable(guid.to_string()))
    }
}

/// Stands in for ffmpeg: "decrypting" copies, merging concatenates. A failing
/// call writes some output first, like an ffmpeg run that dies halfway.
#[derive(Default)]
struct CopyToolkit {
    fail_decrypt_for: Option<&'static str>,
    fail_merge: bool,
    fail_subtitles: bool,
    calls: Mutex<Vec<String>>,
}

impl CopyToolkit {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn ffmpeg_failure() -> TsumugiError {
    ProcessError::NonZeroExit {
        program: "ffmpeg".to_string(),
        code: Some(1),
        stderr: "Invalid data found when processing input".to_string(),
    }
    .into()
}

impl MediaToolkit for CopyToolkit {
    async fn decrypt(&self, key: &ContentKey, input: &Path, output: &Path) -> TsumugiResult<()> {
        self.record(format!("decrypt {}", key.to_hex()));
        if let Some(marker) = self.fail_decrypt_for {
            if input.to_string_lossy().contains(marker) {
                tokio::fs::write(output, b"partial-decrypt").await?;
                return Err(ffmpeg_failure());
            }
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        audio_language: &str,
        output: &Path,
    ) -> TsumugiResult<()> {
        self.record(format!("merge {audio_language}"));
        if self.fail_merge {
            tokio::fs::write(output, b"partial-merge").await?;
            return Err(ffmpeg_failure());
        }
        let mut data = tokio::fs::read(video).await?;
        data.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, data).await?;
        Ok(())
    }

    async fn add_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        language: &str,
        output: &Path,
    ) -> TsumugiResult<()> {
        self.record(format!("subtitles {language}"));
        if self.fail_subtitles {
            tokio::fs::write(output, b"partial-mux").await?;
            return Err(ffmpeg_failure());
        }
        assert!(tokio::fs::metadata(subtitles).await.is_ok());
        tokio::fs::copy(video, output).await?;
        Ok(())
    }
}

type TestPipeline = AcquisitionPipeline<StaticSource, MockCdm, CopyToolkit>;

async fn setup() -> MockServer {
    let server = MockServer::start().await;
    mount_media(&server).await;
    Mock::given(method("POST"))
        .and(path("/license"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "license": "bGljZW5zZQ==" })),
        )
        .mount(&server)
        .await;
    server
}

fn playback(server: &MockServer, with_subtitles: bool) -> Playback {
    let uri = server.uri();
    let mut subtitles = BTreeMap::new();
    if with_subtitles {
        subtitles.insert(
            "en-US".to_string(),
            SubtitleTrack {
                url: format!("{uri}/subs/en.ass"),
                format: "ass".to_string(),
            },
        );
    }
    Playback {
        manifest_url: format!("{uri}/manifest.mpd?playbackGuid=PRIVTOKEN&accountid=ACCOUNT"),
        subtitles,
    }
}

fn job(number: u32, title: &str, subtitle_locale: Option<&str>) -> EpisodeJob {
    EpisodeJob {
        season_title: "Season 1".to_string(),
        number,
        title: title.to_string(),
        guid: format!("GUID-{number}"),
        audio_locale: "ja-JP".to_string(),
        subtitle_locale: subtitle_locale.map(str::to_string),
    }
}

fn pipeline(
    server: &MockServer,
    playbacks: impl IntoIterator<Item = (String, Playback)>,
    toolkit: CopyToolkit,
    output: &Path,
) -> TestPipeline {
    let license_url = Url::parse(&format!("{}/license", server.uri())).unwrap();
    let license = LicenseExchange::new(
        MockCdm::with_content_key(),
        LicenseServer::new(reqwest::Client::new(), license_url),
    );
    let source = StaticSource {
        playbacks: playbacks.into_iter().collect(),
    };
    AcquisitionPipeline::new(source, license, toolkit, output).bearer("access-token")
}

fn files(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_episode_with_subtitles() -> anyhow::Result<()> {
    let server = setup().await;
    Mock::given(method("GET"))
        .and(path("/subs/en.ass"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[Script Info]\n"))
        .mount(&server)
        .await;

    let output = tempfile::tempdir()?;
    let job = job(1, "Pilot", Some("en-US"));
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, true))],
        CopyToolkit::default(),
        output.path(),
    );

    let outcome = pipeline.run_episode(&job).await.assert_success();
    let season = output.path().join("Season 1");
    assert_eq!(outcome, EpisodeOutcome::Done(season.join("1. Pilot.mp4")));
    assert_eq!(files(&season), BTreeSet::from(["1. Pilot.mp4".to_string()]));

    // video boxes followed by audio boxes
    let data = tokio::fs::read(season.join("1. Pilot.mp4")).await?;
    assert_eq!(walk_boxes(&data).assert_success().len(), 24);

    let key = "42".repeat(16);
    let calls = pipeline_calls(&pipeline);
    assert_eq!(
        calls,
        [
            format!("decrypt {key}"),
            format!("decrypt {key}"),
            "merge jpn".to_string(),
            "subtitles eng".to_string(),
        ]
    );
    Ok(())
}

fn pipeline_calls(pipeline: &TestPipeline) -> Vec<String> {
    pipeline.toolkit().calls.lock().unwrap().clone()
}

#[tokio::test]
async fn test_subtitle_download_failure_keeps_merged_file() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let job = job(2, "No Subs", Some("en-US"));
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, true))],
        CopyToolkit::default(),
        output.path(),
    );

    let outcome = pipeline.run_episode(&job).await.assert_success();
    let season = output.path().join("Season 1");
    assert_eq!(outcome, EpisodeOutcome::Done(season.join("2. No Subs.mp4")));
    assert_eq!(files(&season), BTreeSet::from(["2. No Subs.mp4".to_string()]));
    assert!(!pipeline_calls(&pipeline).iter().any(|call| call.starts_with("subtitles")));
    Ok(())
}

#[tokio::test]
async fn test_subtitle_mux_failure_keeps_merged_file() -> anyhow::Result<()> {
    let server = setup().await;
    Mock::given(method("GET"))
        .and(path("/subs/en.ass"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[Script Info]\n"))
        .mount(&server)
        .await;

    let output = tempfile::tempdir()?;
    let job = job(3, "Bad Mux", Some("en-US"));
    let toolkit = CopyToolkit {
        fail_subtitles: true,
        ..Default::default()
    };
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, true))],
        toolkit,
        output.path(),
    );

    pipeline.run_episode(&job).await.assert_success();
    let season = output.path().join("Season 1");
    assert_eq!(files(&season), BTreeSet::from(["3. Bad Mux.mp4".to_string()]));
    let data = tokio::fs::read(season.join("3. Bad Mux.mp4")).await?;
    assert_eq!(walk_boxes(&data).assert_success().len(), 24);
    Ok(())
}

#[tokio::test]
async fn test_no_subtitles_merges_to_final_name() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let job = job(4, "Plain", None);
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, true))],
        CopyToolkit::default(),
        output.path(),
    );

    pipeline.run_episode(&job).await.assert_success();
    let season = output.path().join("Season 1");
    assert_eq!(files(&season), BTreeSet::from(["4. Plain.mp4".to_string()]));
    assert_eq!(pipeline_calls(&pipeline).last().map(String::as_str), Some("merge jpn"));
    Ok(())
}

#[tokio::test]
async fn test_decrypt_failure_keeps_encrypted_and_batch_continues() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let jobs = [job(1, "Broken", None), job(2, "Fine", None)];
    let toolkit = CopyToolkit {
        fail_decrypt_for: Some("Broken"),
        ..Default::default()
    };
    let pipeline = pipeline(
        &server,
        jobs.iter()
            .map(|job| (job.guid.clone(), playback(&server, false))),
        toolkit,
        output.path(),
    );

    let reports = pipeline.run_batch(&jobs).await;
    assert_eq!(reports.len(), 2);

    let error = reports[0].result.as_ref().unwrap_err();
    assert_eq!(error.stage, Stage::Decrypting);
    assert!(matches!(error.source, TsumugiError::ExternalProcessError(_)));
    assert_eq!(reports[0].episode, "Season 1 - 1. Broken");
    assert!(reports[1].is_success());

    let season = output.path().join("Season 1");
    assert_eq!(
        files(&season),
        BTreeSet::from([
            "1. Broken-encrypted.mp4".to_string(),
            "1. Broken-encrypted.m4a".to_string(),
            "2. Fine.mp4".to_string(),
        ])
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_fragment_is_skipped() -> anyhow::Result<()> {
    let server = setup().await;
    Mock::given(method("GET"))
        .and(path("/video/v1080/3.m4s"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;

    let output = tempfile::tempdir()?;
    let job = job(5, "Gap", None);
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, false))],
        CopyToolkit::default(),
        output.path(),
    );

    pipeline.run_episode(&job).await.assert_success();
    let data = tokio::fs::read(output.path().join("Season 1/5. Gap.mp4")).await?;
    // one moof/mdat pair less on the video side
    assert_eq!(walk_boxes(&data).assert_success().len(), 22);
    Ok(())
}

#[tokio::test]
async fn test_existing_final_file_is_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let output = tempfile::tempdir()?;
    let season = output.path().join("Season 1");
    tokio::fs::create_dir_all(&season).await?;
    tokio::fs::write(season.join("6. Done.mp4"), b"finished").await?;

    let job = job(6, "Done", None);
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, false))],
        CopyToolkit::default(),
        output.path(),
    );

    let outcome = pipeline.run_episode(&job).await.assert_success();
    assert_eq!(outcome, EpisodeOutcome::Skipped(season.join("6. Done.mp4")));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_resume_from_decrypted_tracks() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let season = output.path().join("Season 1");
    tokio::fs::create_dir_all(&season).await?;
    tokio::fs::write(season.join("7. Resume-decrypted.mp4"), b"video").await?;
    tokio::fs::write(season.join("7. Resume-decrypted.m4a"), b"audio").await?;

    let job = job(7, "Resume", None);
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, false))],
        CopyToolkit::default(),
        output.path(),
    );

    pipeline.run_episode(&job).await.assert_success();
    assert_eq!(tokio::fs::read(season.join("7. Resume.mp4")).await?, b"videoaudio");
    assert_eq!(pipeline_calls(&pipeline), ["merge jpn"]);

    // only the manifest was fetched
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/manifest.mpd");
    Ok(())
}

#[tokio::test]
async fn test_missing_playback_token() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let job = job(8, "Tokenless", None);
    let mut playback = playback(&server, false);
    playback.manifest_url = format!("{}/manifest.mpd", server.uri());
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback)],
        CopyToolkit::default(),
        output.path(),
    );

    let error = pipeline.run_episode(&job).await.unwrap_err();
    assert_eq!(error.stage, Stage::KeyAcquired);
    assert!(matches!(error.source, TsumugiError::MissingPlaybackToken(_)));
    assert!(output
        .path()
        .join("Season 1/8. Tokenless-encrypted.mp4")
        .exists());
    Ok(())
}

#[tokio::test]
async fn test_playback_unavailable() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let pipeline = pipeline(&server, [], CopyToolkit::default(), output.path());

    let error = pipeline
        .run_episode(&job(9, "Gone", None))
        .await
        .unwrap_err();
    assert_eq!(error.stage, Stage::FetchingManifest);
    assert!(error.to_string().starts_with("[Season 1 - 9. Gone] fetching manifest failed"));
    Ok(())
}

#[tokio::test]
async fn test_merge_failure_keeps_decrypted_tracks() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let job = job(10, "Retry", None);
    let playbacks = [(job.guid.clone(), playback(&server, false))];
    let toolkit = CopyToolkit {
        fail_merge: true,
        ..Default::default()
    };

    let failing = pipeline(&server, playbacks.clone(), toolkit, output.path());
    let error = failing.run_episode(&job).await.unwrap_err();
    assert_eq!(error.stage, Stage::Merging);
    let season = output.path().join("Season 1");
    assert_eq!(
        files(&season),
        BTreeSet::from([
            "10. Retry-decrypted.m4a".to_string(),
            "10. Retry-decrypted.mp4".to_string(),
        ])
    );

    // the next run merges what the failed one decrypted
    let retry = pipeline(&server, playbacks, CopyToolkit::default(), output.path());
    let outcome = retry.run_episode(&job).await.assert_success();
    assert_eq!(outcome, EpisodeOutcome::Done(season.join("10. Retry.mp4")));
    assert_eq!(pipeline_calls(&retry), ["merge jpn"]);
    assert_eq!(files(&season), BTreeSet::from(["10. Retry.mp4".to_string()]));
    let data = tokio::fs::read(season.join("10. Retry.mp4")).await?;
    assert_eq!(walk_boxes(&data).assert_success().len(), 24);
    Ok(())
}

#[tokio::test]
async fn test_decrypt_failure_is_retried_from_scratch() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let job = job(11, "Half", None);
    let playbacks = [(job.guid.clone(), playback(&server, false))];
    let toolkit = CopyToolkit {
        fail_decrypt_for: Some("Half"),
        ..Default::default()
    };

    let failing = pipeline(&server, playbacks.clone(), toolkit, output.path());
    let error = failing.run_episode(&job).await.unwrap_err();
    assert_eq!(error.stage, Stage::Decrypting);
    let season = output.path().join("Season 1");
    assert_eq!(
        files(&season),
        BTreeSet::from([
            "11. Half-encrypted.m4a".to_string(),
            "11. Half-encrypted.mp4".to_string(),
        ])
    );

    let retry = pipeline(&server, playbacks, CopyToolkit::default(), output.path());
    retry.run_episode(&job).await.assert_success();
    assert_eq!(files(&season), BTreeSet::from(["11. Half.mp4".to_string()]));
    let data = tokio::fs::read(season.join("11. Half.mp4")).await?;
    assert!(!data.starts_with(b"partial-decrypt"));
    assert_eq!(walk_boxes(&data).assert_success().len(), 24);
    Ok(())
}

#[tokio::test]
async fn test_leftover_partial_file_is_not_trusted() -> anyhow::Result<()> {
    let server = setup().await;
    let output = tempfile::tempdir()?;
    let season = output.path().join("Season 1");
    tokio::fs::create_dir_all(&season).await?;
    // left by a run that was killed while decrypting
    tokio::fs::write(season.join("12. Killed-decrypted.part.mp4"), b"partial").await?;

    let job = job(12, "Killed", None);
    let pipeline = pipeline(
        &server,
        [(job.guid.clone(), playback(&server, false))],
        CopyToolkit::default(),
        output.path(),
    );

    pipeline.run_episode(&job).await.assert_success();
    assert_eq!(files(&season), BTreeSet::from(["12. Killed.mp4".to_string()]));
    let data = tokio::fs::read(season.join("12. Killed.mp4")).await?;
    assert_eq!(walk_boxes(&data).assert_success().len(), 24);
    Ok(())
}
