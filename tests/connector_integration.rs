//! End-to-end tests: TCP ingress -> router -> storage worker -> fake RRDtool.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use metro_connector::{
    Connector, ConnectorInputs, IngressListener, MetricRouter, ReloadController, SchemaCache,
    StorageBuilder, StorageError, YamlProvider, reload_channel,
};
use tempfile::tempdir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const HOSTS: &str = r#"
hosts:
  srv1:
    cpu:
      id: 1
      type: GAUGE
      step: 300
      heartbeat: 600
      min: 0
      max: 100
      rra:
        - { type: AVERAGE, xff: 0.5, step: 1, rows: 600 }
"#;

/// A `/bin/sh` stand-in for `rrdtool -` that logs every request line.
fn fake_rrdtool(dir: &Path, log: &Path) -> PathBuf {
    let path = dir.join("rrdtool");
    let script = format!(
        r#"#!/bin/sh
while IFS= read -r line; do
  printf '%s\n' "$line" >> '{log}'
  set -- $line
  if [ "$1" = create ]; then : > "$2"; fi
  echo "OK u:0.00 s:0.00 r:0.00"
done
"#,
        log = log.display()
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn perf(timestamp: &str, value: &str, host: &str, datasource: &str) -> String {
    format!(
        r#"{{"type":"chat","body":[{{"name":"perf","children":[{{"name":"timestamp","text":"{timestamp}"}},{{"name":"value","text":"{value}"}},{{"name":"host","text":"{host}"}},{{"name":"datasource","text":"{datasource}"}}]}}]}}"#
    )
}

#[tokio::test]
async fn test_metrics_flow_to_rrdtool() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("requests.log");
    let base = dir.path().join("rrd");
    let hosts = dir.path().join("hosts.yaml");
    std::fs::write(&hosts, HOSTS).unwrap();

    let mut cache = SchemaCache::new(Box::new(YamlProvider::new(&hosts)));
    cache.refresh().await;

    let mut handles = StorageBuilder::new(&base)
        .rrd_bin(fake_rrdtool(dir.path(), &log))
        .build()
        .unwrap();
    let writer = handles.writer.clone();
    let router = MetricRouter::new(cache.reader(), handles.writer.clone(), &base);

    let listener = IngressListener::bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frame_tx, frames) = mpsc::channel(16);
    tokio::spawn(listener.run(frame_tx));

    let client = tokio::spawn(async move {
        let lines = [
            // Missing value: dropped.
            r#"{"type":"chat","body":[{"name":"perf","children":[{"name":"timestamp","text":"1000"},{"name":"host","text":"srv1"},{"name":"datasource","text":"cpu"}]}]}"#.to_string(),
            // Unknown host: dropped.
            perf("1000", "1", "srv9", "cpu"),
            perf("1000", "42", "srv1", "cpu"),
            r#"{"type":"items","items":[{"kind":"retract"},{"kind":"purge"}]}"#.to_string(),
            perf("1300", "43", "srv1", "cpu"),
        ];
        let mut stream = TcpStream::connect(addr).await.unwrap();
        for line in lines {
            stream.write_all(line.as_bytes()).await.unwrap();
            stream.write_all(b"\n").await.unwrap();
        }
        stream.shutdown().await.unwrap();
    });

    let (_trigger, reloads) = reload_channel();
    let inputs = ConnectorInputs {
        frames,
        reloads,
        faults: handles.take_faults(),
    };
    let connector = Connector::new(
        cache,
        router,
        ReloadController::new(None),
        Duration::from_secs(10),
    );

    let done = async move {
        while writer.submitted() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    let stats = tokio::time::timeout(Duration::from_secs(10), connector.run(inputs, done))
        .await
        .unwrap()
        .unwrap();
    client.await.unwrap();
    handles.shutdown().unwrap();

    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.invalid, 1);
    assert_eq!(stats.unknown, 1);

    let file = base.join("srv1").join("cpu");
    assert!(file.is_file());

    let logged = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = logged.lines().collect();
    assert_eq!(
        lines,
        vec![
            format!(
                "create {} --step 300 --start 990 RRA:AVERAGE:0.5:1:600 DS:cpu:GAUGE:600:0:100",
                file.display()
            ),
            format!("update {} 1000:42", file.display()),
            format!("update {} 1300:43", file.display()),
        ]
    );
}

#[test]
fn test_unusable_base_dir_is_fatal() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("rrd");
    std::fs::write(&base, "not a directory").unwrap();

    let result = StorageBuilder::new(&base)
        .rrd_bin(fake_rrdtool(dir.path(), &dir.path().join("log")))
        .build();
    assert!(matches!(result, Err(StorageError::DirectoryAccess { .. })));
}

#[test]
fn test_missing_binary_is_fatal() {
    let dir = tempdir().unwrap();
    let result = StorageBuilder::new(dir.path().join("rrd"))
        .rrd_bin(dir.path().join("no-such-rrdtool"))
        .build();

    let err = result.err().unwrap();
    assert!(err.is_fatal());
    assert!(matches!(err, StorageError::ProcessSpawn { .. }));
}
