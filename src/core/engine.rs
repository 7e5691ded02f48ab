// src/core/engine.rs
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, debug, warn};

use crate::config::Config;
use super::{
    build, render_flow, render_stack, render_tree, write_artifact, FlowTableBuilder,
    LogLineParser, OutputMode, Request, RequestFilter, SessionTreeBuilder, TimeWindow,
};

/// Line counts gathered while scanning a log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Lines read
    pub lines: usize,
    /// Lines that fit the log grammar
    pub matched: usize,
    /// Requests that passed the window and path policy
    pub in_window: usize,
}

/// Main orchestration engine: scan, filter, build one view, write it
pub struct Engine {
    config: Config,
    parser: LogLineParser,
}

impl Engine {
    /// Create a new engine from the configuration found at (or near) `config_path`
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)
            .context("Failed to load configuration")?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self::with_config(config))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            parser: LogLineParser::new(),
        }
    }

    /// Analyze a different log than the configured one
    pub fn with_log_path(mut self, path: PathBuf) -> Self {
        self.config.log.path = path;
        self
    }

    /// Write artifacts somewhere other than the configured directory
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.dir = dir;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write the built-in default configuration as `loghistory.toml` under `path`
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let dir = path.unwrap_or_else(|| PathBuf::from("."));
        let target = dir.join("loghistory.toml");

        if target.exists() && !force {
            bail!("{} already exists, pass --force to overwrite it", target.display());
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Config::default()
            .save(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        info!("Wrote default configuration to {}", target.display());
        Ok(())
    }

    /// Analyze the log and write the artifact for `mode`; returns the artifact path.
    ///
    /// Without a window the hour leading up to now is analyzed.
    pub async fn run(&self, window: Option<TimeWindow>, mode: OutputMode) -> Result<PathBuf> {
        let window = window
            .unwrap_or_else(|| TimeWindow::trailing_hour(Local::now().naive_local()));

        info!(
            %mode,
            start = %window.start,
            end = %window.end,
            log = %self.config.log.path.display(),
            "Starting analysis"
        );

        let filter = RequestFilter::new(window, &self.config.filters);
        let (requests, stats) = self.read_requests(&filter).await?;
        info!(
            lines = stats.lines,
            matched = stats.matched,
            in_window = stats.in_window,
            "Scanned access log"
        );

        let document = self
            .render(&requests, mode)
            .with_context(|| format!("Failed to build the {} view", mode))?;

        let path = self.config.output.dir.join(mode.file_name());
        write_artifact(&path, &document)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Wrote {}", path.display());
        Ok(path)
    }

    /// Read the whole log, keeping the requests `filter` admits, in log order
    pub async fn read_requests(&self, filter: &RequestFilter) -> Result<(Vec<Request>, ScanStats)> {
        let path = &self.config.log.path;
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open access log {}", path.display()))?;

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut requests = Vec::new();
        let mut stats = ScanStats::default();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .with_context(|| format!("Failed to read access log {}", path.display()))?;
            if read == 0 {
                break;
            }
            stats.lines += 1;

            // foreign bytes only spoil the line they are on
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(&['\n', '\r'][..]);

            let parsed = self
                .parser
                .parse_line(line, stats.lines)
                .with_context(|| format!("Failed to parse access log {}", path.display()))?;
            let Some(request) = parsed else {
                continue;
            };
            stats.matched += 1;

            if filter.admits(&request) {
                stats.in_window += 1;
                requests.push(request);
            }
        }

        Ok((requests, stats))
    }

    /// Build the view for `mode` over in-window requests and serialize it
    pub fn render(&self, requests: &[Request], mode: OutputMode) -> Result<String> {
        let document = match mode {
            OutputMode::Tree => {
                let tree = build(SessionTreeBuilder::new(&self.config), requests)?;
                info!(
                    sessions = tree.sessions().len(),
                    bots = tree.sessions().bot_count(),
                    pages = tree.node_count(),
                    dropped = tree.dropped(),
                    "Navigation tree ready"
                );
                if tree.sessions().is_empty() {
                    warn!("No visitor sessions in the requested window");
                }
                render_tree(&tree)?
            }
            OutputMode::Flow | OutputMode::Stack => {
                let table = build(FlowTableBuilder::new(&self.config), requests)?;
                info!(
                    rows = table.rows().count(),
                    synthesized = table.synthesized(),
                    "Flow table ready"
                );
                if table.is_empty() {
                    warn!("No visitor sessions in the requested window");
                }
                if mode == OutputMode::Stack {
                    render_stack(&table)?
                } else {
                    render_flow(&table)?
                }
            }
        };

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    const LOG: &str = concat!(
        "1.2.3.4 - - [10/Oct/2026:13:00:00 +0200] \"GET /index.php HTTP/1.1\" 200 2326 \"-\" \"Mozilla/5.0\"\n",
        "1.2.3.4 - - [10/Oct/2026:13:00:04 +0200] \"GET /img/logo.png HTTP/1.1\" 200 900 \"http://www.example.com/index.php\" \"Mozilla/5.0\"\n",
        "this line is not part of any access log\n",
        "1.2.3.4 - - [10/Oct/2026:13:00:10 +0200] \"GET /about.php HTTP/1.1\" 200 1200 \"http://www.example.com/index.php\" \"Mozilla/5.0\"\n",
        "5.6.7.8 - - [10/Oct/2026:18:00:00 +0200] \"GET /index.php HTTP/1.1\" 200 2326 \"-\" \"Googlebot/2.1\"\r\n",
    );

    fn engine(temp: &assert_fs::TempDir) -> Engine {
        let log = temp.child("access.log");
        log.write_str(LOG).unwrap();

        let mut config = Config::default();
        config.site.name = "www.example.com".to_string();
        config.site.protocol = "http://".to_string();
        Engine::with_config(config)
            .with_log_path(log.path().to_path_buf())
            .with_output_dir(temp.child("data").path().to_path_buf())
    }

    fn window() -> Option<TimeWindow> {
        Some(TimeWindow::parse("10/10/2026@12:00:00", "10/10/2026@14:00:00").unwrap())
    }

    #[tokio::test]
    async fn test_scan_counts_and_filters() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);
        let filter = RequestFilter::new(window().unwrap(), &engine.config().filters);

        let (requests, stats) = engine.read_requests(&filter).await.unwrap();

        assert_eq!(stats, ScanStats { lines: 5, matched: 4, in_window: 2 });
        let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/index.php", "/about.php"]);
    }

    #[tokio::test]
    async fn test_tree_run_end_to_end() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);

        let path = engine.run(window(), OutputMode::Tree).await.unwrap();

        assert_eq!(path, temp.child("data").child("tree.json").path());
        let tree: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(tree["name"], "root_log");
        let sessions = tree["children"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["name"], "1.2.3.4");
        assert_eq!(sessions[0]["count"], 2);
        let roots = sessions[0]["children"].as_array().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0]["name"], "/index.php");
        let children = roots[0]["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["name"], "/about.php");
    }

    #[tokio::test]
    async fn test_flow_and_stack_runs() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);

        engine.run(window(), OutputMode::Flow).await.unwrap();
        engine.run(window(), OutputMode::Stack).await.unwrap();

        temp.child("data/flow.json").assert(
            r#"[{"name":"1.2.3.4","team":"1.2.3.4","0":"/index.php","10":"/about.php"}]"#,
        );
        temp.child("data/stack.json")
            .assert(predicate::str::starts_with(r#"{"start_time":1791630000000,"data":[{"#));
    }

    #[tokio::test]
    async fn test_runs_are_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);

        let path = engine.run(window(), OutputMode::Tree).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        let path = engine.run(window(), OutputMode::Tree).await.unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_run_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);
        let empty = Some(TimeWindow::parse("01/01/2020@00:00:00", "01/01/2020@01:00:00").unwrap());

        let err = engine.run(empty, OutputMode::Stack).await.unwrap_err();

        assert!(format!("{:#}", err).contains("stack"));
        temp.child("data/stack.json").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn test_missing_log_names_the_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp).with_log_path(temp.child("nope.log").path().to_path_buf());

        let err = engine.run(window(), OutputMode::Tree).await.unwrap_err();

        assert!(format!("{:#}", err).contains("nope.log"));
        temp.child("data/tree.json").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn test_malformed_timestamp_aborts_with_line_number() {
        let temp = assert_fs::TempDir::new().unwrap();
        let log = temp.child("bad.log");
        log.write_str(
            "1.2.3.4 - - [10/Zzz/2026:13:00:00 +0200] \"GET / HTTP/1.1\" 200 1 \"-\" \"curl\"\n",
        )
        .unwrap();
        let engine = engine(&temp).with_log_path(log.path().to_path_buf());

        let err = engine.run(window(), OutputMode::Tree).await.unwrap_err();

        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[tokio::test]
    async fn test_oversized_byte_count_only_drops_its_line() {
        let temp = assert_fs::TempDir::new().unwrap();
        let log = temp.child("huge.log");
        log.write_str(concat!(
            "1.2.3.4 - - [10/Oct/2026:13:00:00 +0200] \"GET /index.php HTTP/1.1\" 200 10 \"-\" \"Mozilla/5.0\"\n",
            "1.2.3.4 - - [10/Oct/2026:13:00:05 +0200] \"GET /about.php HTTP/1.1\" 200 99999999999999999999999 \"http://www.example.com/index.php\" \"Mozilla/5.0\"\n",
        ))
        .unwrap();
        let engine = engine(&temp).with_log_path(log.path().to_path_buf());

        let path = engine.run(window(), OutputMode::Tree).await.unwrap();

        let tree: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(tree["children"][0]["count"], 1);
        assert_eq!(tree["children"][0]["children"][0]["name"], "/index.php");
    }

    #[tokio::test]
    async fn test_init_writes_defaults_not_the_loaded_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);

        engine.init(Some(temp.path().to_path_buf()), false).await.unwrap();

        let written = Config::load(temp.child("loghistory.toml").path()).unwrap();
        assert_eq!(written.site.name, Config::default().site.name);
        temp.child("loghistory.toml")
            .assert(predicate::str::contains("www.example.com").not());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let temp = assert_fs::TempDir::new().unwrap();
        let engine = engine(&temp);
        let dir = temp.child("conf").path().to_path_buf();

        engine.init(Some(dir.clone()), false).await.unwrap();
        temp.child("conf/loghistory.toml").assert(predicate::path::exists());

        assert!(engine.init(Some(dir.clone()), false).await.is_err());
        engine.init(Some(dir), true).await.unwrap();
    }
}
