//! End-to-end pipeline runs against local `file://` archives.
//!
//! External commands go through `DryRunCommandRunner`, so no docker is needed.

use flate2::write::GzEncoder;
use flate2::Compression;
use logagg_common::{AggregationUnit, CancelFlag};
use logagg_config::{IntegrationToolConfig, Layout};
use logagg_core::{
    run_from_config_file, run_units, Collaborators, DockerDashboardDeployer, DryRunCommandRunner,
    ExitCode, HttpDownloader, Pipeline, PipelineState, Stage,
};
use logagg_store::{AuditTrail, PartitionedStore};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn write_tgz(path: &Path, files: &[(&str, Vec<u8>)]) {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, name, data.as_slice())
            .unwrap();
    }
    fs::write(path, gzip(&builder.into_inner().unwrap())).unwrap();
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn config_json(archive_url: &str) -> String {
    format!(
        r#"{{
            "kibana": {{"host": "kibana", "port": 5601}},
            "logstash": {{"host": "logstash", "port": 5044}},
            "elastic": {{
                "host": "elastic", "port": 9200, "user": "elastic", "pass": "changeme"
            }},
            "filebeatImage": "corfudb/filebeat:latest",
            "kibanaToolsImage": "corfudb/kibana-tools:latest",
            "archives": [{{"name": "server1", "url": "{archive_url}"}}],
            "allowedSubtrees": ["var/log/corfu"],
            "transform": [{{"path": "server1/var/log/corfu", "commands": ["ls -la"]}}]
        }}"#
    )
}

/// Source archive for the `corfu-run-42` scenario.
fn scenario_archive(dir: &Path) -> String {
    let source = dir.join("incoming/server1.tgz");
    fs::create_dir_all(source.parent().unwrap()).unwrap();
    write_tgz(
        &source,
        &[
            ("server1/var/log/corfu/corfu.log", b"hello".to_vec()),
            ("server1/var/log/corfu/corfu.log.1.gz", gzip(b"older")),
            ("server1/etc/corfu.yml", b"not extracted".to_vec()),
        ],
    );
    file_url(&source)
}

fn messages(store: &PartitionedStore, unit: &AggregationUnit) -> Vec<String> {
    AuditTrail::new(store)
        .read_all(unit)
        .unwrap()
        .into_iter()
        .map(|m| m.message)
        .collect()
}

fn position(messages: &[String], wanted: &str) -> usize {
    messages
        .iter()
        .position(|m| m == wanted)
        .unwrap_or_else(|| panic!("{wanted:?} not in {messages:#?}"))
}

#[test]
fn test_corfu_scenario_runs_every_stage() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("root"));
    let store = PartitionedStore::open(layout.db_dir()).unwrap();
    let config =
        IntegrationToolConfig::from_json_str(&config_json(&scenario_archive(dir.path())))
            .unwrap();
    let unit = AggregationUnit::parse("corfu-run-42").unwrap();

    let runner = DryRunCommandRunner::new();
    let downloader = HttpDownloader::new();
    let dashboards = DockerDashboardDeployer::new(&runner);
    let collaborators = Collaborators {
        downloader: &downloader,
        runner: &runner,
        dashboards: &dashboards,
    };
    let cancel = CancelFlag::new();

    let report = Pipeline::new(&store, &layout, &config, collaborators, &cancel).run(&unit);

    assert_eq!(report.final_state, PipelineState::Done);
    assert!(report.is_clean(), "{report:#?}");
    assert_eq!(report.exit_code(), ExitCode::Clean);
    let stages: Vec<_> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, Stage::ALL.to_vec());

    let corfu_dir = layout.server_dir(&unit, "server1").join("var/log/corfu");
    assert_eq!(fs::read_to_string(corfu_dir.join("corfu.log")).unwrap(), "hello");
    assert_eq!(fs::read_to_string(corfu_dir.join("corfu.log.1")).unwrap(), "older");
    assert!(!corfu_dir.join("corfu.log.1.gz").exists());
    assert!(!layout.server_dir(&unit, "server1").join("etc").exists());
    assert!(layout.archives_dir(&unit).join("server1.tgz").is_file());

    let commands = runner.commands();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].command, "ls -la");
    assert_eq!(commands[0].working_dir.as_deref(), Some(corfu_dir.as_path()));
    assert!(commands[1].command.contains("-E BASE_DIR=/data/corfu-run-42/server1"));
    assert!(commands[2].label.contains("--pass=<redacted>"));

    let log = messages(&store, &unit);
    assert_eq!(log.first().map(String::as_str), Some("start processing"));
    assert_eq!(log.last().map(String::as_str), Some("Done"));
    assert!(
        position(&log, "start unarchive process")
            < position(&log, "Unarchive completed. Step 2 of 5 finished")
    );
    assert!(
        position(&log, "Downloading completed. Step 1 of 5 finished")
            < position(&log, "start unarchive process")
    );
    let unzip_logs = format!("Unzip logs: {}", corfu_dir.display());
    let unzip_file = format!("Unzip file: {}", corfu_dir.join("corfu.log.1").display());
    assert!(position(&log, &unzip_logs) < position(&log, &unzip_file));
    assert!(log.iter().any(|m| m.starts_with("Downloaded server1.tgz (")));

    store.close().unwrap();
}

#[test]
fn test_malformed_archive_fails_extract_but_run_completes() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("root"));
    let store = PartitionedStore::open(layout.db_dir()).unwrap();
    let source = dir.path().join("server1.tgz");
    fs::write(&source, b"this is not a gzip stream").unwrap();
    let config = IntegrationToolConfig::from_json_str(&config_json(&file_url(&source))).unwrap();
    let unit = AggregationUnit::parse("broken-run").unwrap();

    let runner = DryRunCommandRunner::new();
    let downloader = HttpDownloader::new();
    let dashboards = DockerDashboardDeployer::new(&runner);
    let collaborators = Collaborators {
        downloader: &downloader,
        runner: &runner,
        dashboards: &dashboards,
    };
    let cancel = CancelFlag::new();

    let report = Pipeline::new(&store, &layout, &config, collaborators, &cancel).run(&unit);

    assert_eq!(report.final_state, PipelineState::Done);
    assert_eq!(report.failed_stages(), vec![Stage::Extract]);
    assert_eq!(report.stages.len(), 5);
    assert_eq!(report.exit_code(), ExitCode::PartialFail);

    let records = AuditTrail::new(&store).read_all(&unit).unwrap();
    let extract_error = records
        .iter()
        .find(|r| r.message.starts_with("Error on extract step: "))
        .expect("extract failure recorded");
    assert!(extract_error.is_error());
    assert!(records
        .iter()
        .any(|r| r.message.starts_with("Fail to unpack the whole Archive: ")));
    for later in [
        "start transforming logs",
        "start loading logs",
        "deploying kibana dashboards",
    ] {
        assert!(records.iter().any(|r| r.message == later), "{later} missing");
    }
    assert_eq!(records.last().unwrap().message, "Done");
}

#[test]
fn test_invalid_config_aborts_before_any_stage() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("root"));
    let store = PartitionedStore::open(layout.db_dir()).unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"kibana": "#).unwrap();
    let unit = AggregationUnit::parse("u1").unwrap();

    let runner = DryRunCommandRunner::new();
    let downloader = HttpDownloader::new();
    let dashboards = DockerDashboardDeployer::new(&runner);
    let collaborators = Collaborators {
        downloader: &downloader,
        runner: &runner,
        dashboards: &dashboards,
    };

    let report = run_from_config_file(
        &store,
        &layout,
        &config_path,
        &unit,
        collaborators,
        &CancelFlag::new(),
    );

    assert_eq!(report.final_state, PipelineState::Aborted);
    assert!(report.stages.is_empty());
    assert_eq!(report.exit_code(), ExitCode::ConfigError);
    assert!(runner.commands().is_empty());

    let log = messages(&store, &unit);
    assert_eq!(log.len(), 1);
    assert!(log[0].starts_with("Configuration error: "));
}

#[test]
fn test_cancelled_run_still_reaches_done() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("root"));
    let store = PartitionedStore::open(layout.db_dir()).unwrap();
    let config =
        IntegrationToolConfig::from_json_str(&config_json(&scenario_archive(dir.path())))
            .unwrap();
    let unit = AggregationUnit::parse("u1").unwrap();

    let runner = DryRunCommandRunner::new();
    let downloader = HttpDownloader::new();
    let dashboards = DockerDashboardDeployer::new(&runner);
    let collaborators = Collaborators {
        downloader: &downloader,
        runner: &runner,
        dashboards: &dashboards,
    };
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = Pipeline::new(&store, &layout, &config, collaborators, &cancel).run(&unit);

    assert_eq!(report.final_state, PipelineState::Done);
    assert_eq!(report.stages.len(), 5);
    assert!(report.stages.iter().all(|s| s.cancelled && !s.succeeded));
    assert_eq!(report.exit_code(), ExitCode::Interrupted);
    assert!(runner.commands().is_empty());
    assert!(!layout.archives_dir(&unit).join("server1.tgz").exists());

    let log = messages(&store, &unit);
    assert_eq!(
        log.iter().filter(|m| m.ends_with("step: cancelled")).count(),
        5
    );
}

#[test]
fn test_units_run_in_parallel_with_isolated_audit_trails() {
    let dir = TempDir::new().unwrap();
    let layout = Layout::new(dir.path().join("root"));
    let store = PartitionedStore::open(layout.db_dir()).unwrap();
    let config =
        IntegrationToolConfig::from_json_str(&config_json(&scenario_archive(dir.path())))
            .unwrap();
    let units = vec![
        AggregationUnit::parse("run-a").unwrap(),
        AggregationUnit::parse("run-b").unwrap(),
        AggregationUnit::parse("run-c").unwrap(),
    ];

    let runner = DryRunCommandRunner::new();
    let downloader = HttpDownloader::new();
    let dashboards = DockerDashboardDeployer::new(&runner);
    let collaborators = Collaborators {
        downloader: &downloader,
        runner: &runner,
        dashboards: &dashboards,
    };
    let cancel = CancelFlag::new();
    let pipeline = Pipeline::new(&store, &layout, &config, collaborators, &cancel);

    let reports = run_units(&pipeline, &units);

    assert_eq!(reports.len(), 3);
    for (unit, report) in units.iter().zip(&reports) {
        assert_eq!(&report.unit, unit);
        assert!(report.is_clean(), "{report:#?}");

        let records = AuditTrail::new(&store).read_all(unit).unwrap();
        assert!(records.iter().all(|r| r.key.aggregation_unit == unit.as_str()));
        assert_eq!(records.iter().filter(|r| r.message == "start processing").count(), 1);
        assert_eq!(
            fs::read_to_string(
                layout
                    .server_dir(unit, "server1")
                    .join("var/log/corfu/corfu.log")
            )
            .unwrap(),
            "hello"
        );
    }
    assert_eq!(
        store.partitions().unwrap(),
        vec!["default", "run-a", "run-b", "run-c"]
    );
}
