//! Integration tests: local HTTP server serving disguised segments, pool
//! fetch with extraction, manifest resolution, and the full manifest job
//! against a stub multiplexer.

mod common;

use common::segment_server::{self, Route};
use dvr_core::carrier::DEFAULT_CHUNK_TAG;
use dvr_core::config::{DvrConfig, RetryConfig};
use dvr_core::control::StopFlag;
use dvr_core::downloader::{self, FetchOptions, SegmentStatus};
use dvr_core::manifest::SegmentManifest;
use dvr_core::pipeline::Pipeline;
use dvr_core::retry::RetryPolicy;
use dvr_core::storage::Workdir;
use std::collections::HashMap;
use std::time::Duration;
use tempfile::tempdir;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

fn opts(workers: usize, policy: RetryPolicy) -> FetchOptions {
    FetchOptions {
        referer: None,
        unwrap_payload: true,
        chunk_tag: DEFAULT_CHUNK_TAG,
        policy,
        workers,
    }
}

/// Distinct, index-dependent payload so misordered writes are caught.
fn payload_for(i: usize) -> Vec<u8> {
    format!("part {i:03} ")
        .into_bytes()
        .into_iter()
        .cycle()
        .take(192 + i)
        .collect()
}

fn wrapped_route(i: usize) -> Route {
    Route::ok(common::wrap_in_carrier(&payload_for(i), DEFAULT_CHUNK_TAG))
}

fn seg_path(i: usize) -> String {
    format!("/seg/{i:05}.png")
}

#[tokio::test]
async fn pool_results_are_index_ascending_and_extracted() {
    let count = 12;
    let mut routes = HashMap::new();
    for i in 1..=count {
        routes.insert(seg_path(i), wrapped_route(i));
    }
    let base = segment_server::start(routes);

    let manifest_text: String = (1..=count).map(|i| format!("{base}{}\n", seg_path(i))).collect();
    let manifest = SegmentManifest::parse(&manifest_text);
    assert_eq!(manifest.len(), count);

    let root = tempdir().unwrap();
    let dir = Workdir::create(Some(root.path())).unwrap();
    let client = reqwest::Client::new();
    let stop = StopFlag::new();

    let results = downloader::fetch_all(
        &client,
        manifest.segments(),
        &dir,
        &opts(8, fast_policy(2)),
        &stop,
    )
    .await;

    assert_eq!(results.len(), count);
    let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
    assert_eq!(indices, (1..=count).collect::<Vec<_>>(), "results must be index-ascending");
    for r in &results {
        assert!(r.is_ok(), "segment {} failed: {:?}", r.index, r.status);
        let written = std::fs::read(r.path.as_ref().unwrap()).unwrap();
        assert_eq!(written, payload_for(r.index), "segment {} content", r.index);
    }
}

#[tokio::test]
async fn failing_segment_leaves_siblings_ok() {
    let count = 6;
    let broken = 4;
    let mut routes = HashMap::new();
    for i in 1..=count {
        let route = if i == broken { Route::error(500) } else { wrapped_route(i) };
        routes.insert(seg_path(i), route);
    }
    let base = segment_server::start(routes);

    let manifest_text: String = (1..=count).map(|i| format!("{base}{}\n", seg_path(i))).collect();
    let manifest = SegmentManifest::parse(&manifest_text);

    let root = tempdir().unwrap();
    let dir = Workdir::create(Some(root.path())).unwrap();
    let client = reqwest::Client::new();
    let stop = StopFlag::new();

    let results = downloader::fetch_all(
        &client,
        manifest.segments(),
        &dir,
        &opts(4, fast_policy(2)),
        &stop,
    )
    .await;

    assert_eq!(results.len(), count, "every segment must be reported");
    for r in &results {
        if r.index == broken {
            assert_eq!(r.status, SegmentStatus::FetchFailed);
            assert!(r.path.is_none());
        } else {
            assert!(r.is_ok(), "segment {} should have survived", r.index);
        }
    }

    let paths = downloader::successful_paths(&results);
    assert_eq!(paths.len(), count - 1);
    let names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "seg_00001.m4s",
            "seg_00002.m4s",
            "seg_00003.m4s",
            "seg_00005.m4s",
            "seg_00006.m4s"
        ],
        "ok paths keep ascending order with the gap closed"
    );
}

#[tokio::test]
async fn throttled_segment_survives_retry() {
    let mut routes = HashMap::new();
    routes.insert(
        seg_path(1),
        Route::flaky(common::wrap_in_carrier(&payload_for(1), DEFAULT_CHUNK_TAG), 2),
    );
    let base = segment_server::start(routes);

    let manifest = SegmentManifest::parse(&format!("{base}{}\n", seg_path(1)));

    let root = tempdir().unwrap();
    let dir = Workdir::create(Some(root.path())).unwrap();
    let client = reqwest::Client::new();
    let stop = StopFlag::new();

    let results = downloader::fetch_all(
        &client,
        manifest.segments(),
        &dir,
        &opts(1, fast_policy(3)),
        &stop,
    )
    .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok(), "two 503s then 200 must fit a 3-attempt budget");
    let written = std::fs::read(results[0].path.as_ref().unwrap()).unwrap();
    assert_eq!(written, payload_for(1));
}

#[tokio::test]
async fn undisguised_body_marks_extract_failed() {
    let mut routes = HashMap::new();
    routes.insert(seg_path(1), Route::ok("just plain media bytes"));
    let base = segment_server::start(routes);

    let manifest = SegmentManifest::parse(&format!("{base}{}\n", seg_path(1)));

    let root = tempdir().unwrap();
    let dir = Workdir::create(Some(root.path())).unwrap();
    let client = reqwest::Client::new();
    let stop = StopFlag::new();

    let results = downloader::fetch_all(
        &client,
        manifest.segments(),
        &dir,
        &opts(1, fast_policy(1)),
        &stop,
    )
    .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, SegmentStatus::ExtractFailed);
    assert!(results[0].path.is_none());
}

#[tokio::test]
async fn plain_mode_writes_bodies_unmodified() {
    let count = 3;
    let mut routes = HashMap::new();
    for i in 1..=count {
        routes.insert(seg_path(i), Route::ok(payload_for(i)));
    }
    let base = segment_server::start(routes);

    let manifest_text: String = (1..=count).map(|i| format!("{base}{}\n", seg_path(i))).collect();
    let manifest = SegmentManifest::parse(&manifest_text);

    let root = tempdir().unwrap();
    let dir = Workdir::create(Some(root.path())).unwrap();
    let client = reqwest::Client::new();
    let stop = StopFlag::new();

    let mut options = opts(2, fast_policy(2));
    options.unwrap_payload = false;
    let results = downloader::fetch_all(&client, manifest.segments(), &dir, &options, &stop).await;

    for r in &results {
        assert!(r.is_ok());
        let written = std::fs::read(r.path.as_ref().unwrap()).unwrap();
        assert_eq!(written, payload_for(r.index), "plain body must land verbatim");
    }
}

#[tokio::test]
async fn triggered_stop_flag_prevents_claims() {
    // No routes: a worker that ignored the flag would error on fetch, not
    // return an empty set.
    let base = segment_server::start(HashMap::new());
    let manifest_text: String = (1..=8).map(|i| format!("{base}{}\n", seg_path(i))).collect();
    let manifest = SegmentManifest::parse(&manifest_text);

    let root = tempdir().unwrap();
    let dir = Workdir::create(Some(root.path())).unwrap();
    let client = reqwest::Client::new();
    let stop = StopFlag::new();
    stop.trigger();

    let results = downloader::fetch_all(
        &client,
        manifest.segments(),
        &dir,
        &opts(4, fast_policy(1)),
        &stop,
    )
    .await;

    assert!(results.is_empty(), "a stopped pool must not claim segments");
}

#[tokio::test]
async fn manifest_fetch_resolves_relative_locations() {
    let mut routes = HashMap::new();
    routes.insert(
        "/v/playlist.txt".to_string(),
        Route::ok("# header line\nseg/00001.png\n\nseg/00002.png\n"),
    );
    let base = segment_server::start(routes);

    let pipeline = Pipeline::new(DvrConfig::default()).unwrap();
    let manifest = pipeline
        .fetch_manifest(&format!("{base}/v/playlist.txt"), None)
        .await
        .unwrap();

    assert_eq!(manifest.len(), 2, "comments and blanks are not segments");
    let locations: Vec<&str> = manifest.segments().iter().map(|s| s.location.as_str()).collect();
    assert_eq!(
        locations,
        vec![
            format!("{base}/v/seg/00001.png"),
            format!("{base}/v/seg/00002.png"),
        ]
    );
}

/// Imitates the concat invocation: answers `-version`, then copies every
/// `file '<path>'` entry of the list after `-i` into the last argument.
#[cfg(unix)]
fn write_stub_multiplexer(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("stub-mux.sh");
    let script = r##"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "stub multiplexer"
    exit 0
fi
list=""
grab=0
out=""
for arg in "$@"; do
    if [ "$grab" = 1 ]; then list="$arg"; grab=0; continue; fi
    if [ "$arg" = "-i" ]; then grab=1; fi
    out="$arg"
done
: > "$out"
while IFS= read -r line; do
    p=${line#file \'}
    p=${p%\'}
    [ "$p" = "$line" ] && continue
    cat "$p" >> "$out"
done < "$list"
"##;
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn fetch_manifest_job_round_trips_payloads() {
    let count = 5;
    let mut routes = HashMap::new();
    let mut expected = Vec::new();
    for i in 1..=count {
        expected.extend_from_slice(&payload_for(i));
        routes.insert(seg_path(i), wrapped_route(i));
    }
    let manifest_text: String = (1..=count).map(|i| format!("seg/{i:05}.png\n")).collect();
    routes.insert("/v/list.txt".to_string(), Route::ok(manifest_text));
    let base = segment_server::start(routes);

    let scratch = tempdir().unwrap();
    let tool = write_stub_multiplexer(scratch.path());

    let mut cfg = DvrConfig::default();
    cfg.ffmpeg_path = Some(tool.to_str().unwrap().to_string());
    cfg.work_root = Some(scratch.path().to_str().unwrap().to_string());
    cfg.retry = Some(RetryConfig {
        max_attempts: 2,
        base_delay_secs: 0.01,
        max_delay_secs: 1,
    });

    let pipeline = Pipeline::new(cfg).unwrap();
    let output = scratch.path().join("out.mp4");
    let stop = StopFlag::new();
    let referer = format!("{base}/watch");

    let report = pipeline
        .fetch_manifest_job(
            &format!("{base}/v/list.txt"),
            Some(referer.as_str()),
            &output,
            false,
            &stop,
        )
        .await
        .unwrap();

    assert_eq!(report.ok_segments, count);
    assert_eq!(report.total_segments, count);
    assert_eq!(report.output, output);

    let combined = std::fs::read(&output).unwrap();
    assert_eq!(combined, expected, "output must be the ascending payload concatenation");
    assert_eq!(report.sha256, dvr_core::checksum::sha256_file(&output).unwrap());
}
