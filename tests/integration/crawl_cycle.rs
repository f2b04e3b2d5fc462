use crate::test_config;
use sumi_tide::job::{run_phase, JobContext, Phase, PhaseOutcome};
use sumi_tide::output::load_statistics;
use sumi_tide::record::CrawlStatus;
use sumi_tide::storage::{RunStatus, SegmentStage};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("home"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/target"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/target"))
        .respond_with(ResponseTemplate::new(200).set_body_string("target"))
        .mount(server)
        .await;
}

fn job_context(dir: &TempDir) -> JobContext {
    let db_path = dir.path().join("crawl.db");
    let config = test_config(db_path.to_str().unwrap());
    JobContext::open(config, "test-hash").unwrap()
}

#[tokio::test]
async fn test_full_crawl_round() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let seeds = dir.path().join("seeds.txt");
    std::fs::write(
        &seeds,
        format!("# seeds\n{base}/\n{base}/gone\tscore=2.5\n{base}/moved\nftp://nope/\n"),
    )
    .unwrap();

    let ctx = job_context(&dir);

    let injected = run_phase(&ctx, Phase::Inject { seeds }).await.unwrap();
    let PhaseOutcome::Injected(summary) = injected else {
        panic!("expected an inject outcome");
    };
    assert_eq!(summary.read, 4);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.added, 3);

    let generated = run_phase(&ctx, Phase::Generate).await.unwrap();
    let PhaseOutcome::Generated { segments, selected, .. } = generated else {
        panic!("expected a generate outcome");
    };
    assert_eq!(segments.len(), 1);
    assert_eq!(selected, 3);

    let fetched = run_phase(&ctx, Phase::Fetch { segment: None }).await.unwrap();
    let PhaseOutcome::Fetched { segment, summary } = fetched else {
        panic!("expected a fetch outcome");
    };
    assert_eq!(segment, segments[0]);
    assert_eq!(summary.fed, 3);
    assert_eq!(summary.success, 2);

    let updated = run_phase(&ctx, Phase::Update { segment: None }).await.unwrap();
    let PhaseOutcome::Updated { summary, .. } = updated else {
        panic!("expected an update outcome");
    };
    assert_eq!(summary.keys, 4);
    assert_eq!(summary.failed, 0);

    let status_of = |suffix: &str| {
        ctx.store()
            .get_record(&format!("{base}{suffix}"))
            .unwrap()
            .map(|record| record.status)
    };
    assert_eq!(status_of("/"), Some(CrawlStatus::DbFetched));
    assert_eq!(status_of("/gone"), Some(CrawlStatus::DbGone));
    assert_eq!(status_of("/moved"), Some(CrawlStatus::DbRedirPerm));
    assert_eq!(status_of("/target"), Some(CrawlStatus::DbFetched));

    let gone = ctx.store().get_record(&format!("{base}/gone")).unwrap().unwrap();
    assert_eq!(gone.score, 2.5);

    let stats = load_statistics(&**ctx.store()).unwrap();
    assert_eq!(stats.total_records, 4);
    assert_eq!(stats.records_by_status[&CrawlStatus::DbFetched], 2);
    assert_eq!(stats.fetched_percentage(), 50.0);
    assert!(stats
        .latest_segments
        .contains(&(SegmentStage::Updated, segment.clone())));
    let run = stats.latest_run.unwrap();
    assert_eq!(run.phase, "update");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
}

#[tokio::test]
async fn test_next_round_skips_records_not_yet_due() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let base = server.uri();

    let dir = TempDir::new().unwrap();
    let seeds = dir.path().join("seeds.txt");
    std::fs::write(&seeds, format!("{base}/\n")).unwrap();

    let ctx = job_context(&dir);
    run_phase(&ctx, Phase::Inject { seeds }).await.unwrap();
    run_phase(&ctx, Phase::Generate).await.unwrap();
    run_phase(&ctx, Phase::Fetch { segment: None }).await.unwrap();
    run_phase(&ctx, Phase::Update { segment: None }).await.unwrap();

    let generated = run_phase(&ctx, Phase::Generate).await.unwrap();
    assert!(matches!(generated, PhaseOutcome::Generated { selected: 0, .. }));
}
