//! `stravajson fetch`: download, merge and save activities.
//!
//! The run goes through these steps in order:
//!
//! 1. Resolve the time window (flag errors abort before any request)
//! 2. Obtain an access token, running the browser flow once if needed
//! 3. Fetch the window; if it is empty and no upper bound was given, probe
//!    for the most recent activity and refetch up to the end of that day
//! 4. In append mode, merge with the existing file, dedupe and sort;
//!    otherwise keep the fetched activities exactly as the API returned them
//! 5. Write the JSON file and print a summary

use std::path::PathBuf;

use chrono::TimeZone;
use stravajson_api::{
    ActivityFetcher, ActivityQuery, ActivitySource, LocalAuthorizer, StravaClient, StravaConfig,
};
use stravajson_core::time::{day_end_exclusive_epoch, now_epoch, now_stamp, parse_local_date};
use stravajson_core::{Activity, Summary, TimeWindow, WindowRequest, merge_dedupe};
use tracing::{debug, info, warn};

use crate::cli::FetchArgs;
use crate::config::Settings;
use crate::credentials::{CredentialStore, resolve_credentials};
use crate::error::ClientResult;
use crate::output::{default_output_path, load_existing, write_json_atomic};

/// Page cap for the one-item probe.
pub const PROBE_MAX_PAGES: u32 = 10;

/// Everything a fetch needs besides the API connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub window: WindowRequest,
    pub per_page: u32,
    pub max_pages: u32,
    pub only_runs: bool,
    pub out: PathBuf,
    pub append: bool,
}

impl FetchOptions {
    /// Validates the CLI flags. `stamp` names the default output file.
    pub fn from_args(args: &FetchArgs, stamp: &str) -> ClientResult<Self> {
        let after_date = args
            .after
            .as_deref()
            .map(|v| parse_local_date("--after", v))
            .transpose()?;
        let before_date = args
            .before
            .as_deref()
            .map(|v| parse_local_date("--before", v))
            .transpose()?;
        let window =
            WindowRequest::from_flags(after_date, args.after_epoch, before_date, args.before_epoch)?;

        Ok(Self {
            window,
            per_page: args.per_page,
            max_pages: args.max_pages,
            only_runs: args.only_runs(),
            out: args.out.clone().unwrap_or_else(|| default_output_path(stamp)),
            append: args.append,
        })
    }

    fn query(&self, window: TimeWindow, now: i64) -> ActivityQuery {
        ActivityQuery::new(window.after)
            .with_before(Some(window.before_or(now)))
            .with_per_page(self.per_page)
            .with_max_pages(self.max_pages)
            .with_only_runs(self.only_runs)
    }
}

/// Outcome of a fetch, used for the printed summary.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// Activities returned by the API in this run.
    pub fetched: usize,
    /// What was written to disk, in file order.
    pub written: Vec<Activity>,
    pub path: PathBuf,
    pub append: bool,
    pub only_runs: bool,
}

impl FetchReport {
    /// Renders the lines printed after a successful run.
    pub fn render(&self) -> ClientResult<String> {
        let mut out = format!(
            "Fetched {} new activities{}.\n",
            self.fetched,
            if self.only_runs { " (runs only)" } else { "" }
        );
        if self.append {
            out.push_str(&format!(
                "Merged dataset size: {} activities -> {}\n",
                self.written.len(),
                self.path.display()
            ));
        } else {
            out.push_str(&format!("Saved to {}\n", self.path.display()));
        }

        let summary = Summary::from_activities(&self.written);
        out.push_str(&format!(
            "Quick summary: {}\n",
            serde_json::to_string_pretty(&summary)?
        ));
        Ok(out)
    }
}

/// Runs `fetch` end to end.
pub async fn run(args: FetchArgs, settings: &Settings) -> ClientResult<()> {
    let options = FetchOptions::from_args(&args, &now_stamp())?;
    let window = options.window.resolve_local()?;
    debug!(?window, "resolved time window");

    let credentials = resolve_credentials(settings, &CredentialStore::at_default_path())?;
    let config = settings.strava_config(credentials);
    let mut client = StravaClient::new(&config)?;

    let fetcher = authenticate(&mut client, settings, &config).await?;
    let report = execute(
        &fetcher,
        &options,
        window,
        options.window.has_explicit_before(),
        &chrono::Local,
        now_epoch(),
    )
    .await?;

    print!("{}", report.render()?);
    Ok(())
}

/// Gets an access token, falling back to the browser flow exactly once.
pub async fn authenticate(
    client: &mut StravaClient,
    settings: &Settings,
    config: &StravaConfig,
) -> ClientResult<ActivityFetcher> {
    match client.authorized_fetcher(settings.auth_code.as_deref()).await {
        Ok(fetcher) => Ok(fetcher),
        Err(e) if e.needs_authorization() => {
            println!("Starting local OAuth flow...");
            let authorizer = LocalAuthorizer::new(settings.authorizer_settings(config));
            let code = authorizer.authorize().await?;
            println!("Got authorization code. Exchanging for tokens...");
            Ok(client.authorized_fetcher(Some(code.as_str())).await?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetches, merges and writes. Nothing is written if fetching fails.
pub async fn execute<S, Tz>(
    source: &S,
    options: &FetchOptions,
    window: TimeWindow,
    explicit_before: bool,
    tz: &Tz,
    now: i64,
) -> ClientResult<FetchReport>
where
    S: ActivitySource + ?Sized,
    Tz: TimeZone,
{
    let fresh = collect_activities(source, options, window, explicit_before, tz, now).await?;
    let fetched = fresh.len();

    let written = if options.append {
        merge_dedupe(load_existing(&options.out), Some(fresh)).into_vec()
    } else {
        fresh
    };

    write_json_atomic(&options.out, &written)?;
    info!(path = %options.out.display(), count = written.len(), "wrote activities");

    Ok(FetchReport {
        fetched,
        written,
        path: options.out.clone(),
        append: options.append,
        only_runs: options.only_runs,
    })
}

/// Fetches the window, with the empty-window fallback.
pub async fn collect_activities<S, Tz>(
    source: &S,
    options: &FetchOptions,
    window: TimeWindow,
    explicit_before: bool,
    tz: &Tz,
    now: i64,
) -> ClientResult<Vec<Activity>>
where
    S: ActivitySource + ?Sized,
    Tz: TimeZone,
{
    let query = options.query(window, now);
    info!(after = query.after, before = ?query.before, "fetching activities");
    let activities = source.fetch_activities(query).await?;

    if !activities.is_empty() || explicit_before {
        return Ok(activities);
    }

    info!("no activities in window, looking for the most recent day with results");
    let probe = query.with_per_page(1).with_max_pages(PROBE_MAX_PAGES);
    let latest = source.fetch_activities(probe).await?;

    let Some(day) = latest.first().and_then(Activity::effective_start_day) else {
        debug!("probe found nothing");
        return Ok(activities);
    };
    let date = match parse_local_date("start_date_local", day) {
        Ok(date) => date,
        Err(e) => {
            warn!("cannot narrow window: {}", e);
            return Ok(activities);
        }
    };

    let before = day_end_exclusive_epoch(date, tz)?;
    info!(day, before, "refetching up to the end of the latest day");
    Ok(source.fetch_activities(query.with_before(Some(before))).await?)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use chrono::FixedOffset;
    use serde_json::json;
    use stravajson_api::{ApiError, ApiResult, BoxFuture};

    use super::*;

    /// Replays canned responses and records every query.
    struct ScriptedSource {
        responses: Mutex<VecDeque<ApiResult<Vec<Activity>>>>,
        queries: Mutex<Vec<ActivityQuery>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<ApiResult<Vec<Activity>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<ActivityQuery> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl ActivitySource for ScriptedSource {
        fn fetch_activities(
            &self,
            query: ActivityQuery,
        ) -> BoxFuture<'_, ApiResult<Vec<Activity>>> {
            self.queries.lock().unwrap().push(query);
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            Box::pin(async move { response })
        }
    }

    fn run(id: u64, start: &str) -> Activity {
        Activity::from_value(json!({
            "id": id,
            "type": "Run",
            "distance": 5000.0,
            "moving_time": 1500,
            "start_date_local": start,
        }))
        .unwrap()
    }

    fn options(out: PathBuf) -> FetchOptions {
        FetchOptions {
            window: WindowRequest::default(),
            per_page: 200,
            max_pages: 10,
            only_runs: true,
            out,
            append: false,
        }
    }

    fn utc_minus_5() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    const NOW: i64 = 1_710_000_000;

    #[tokio::test]
    async fn uses_now_when_before_is_absent() {
        let source = ScriptedSource::new(vec![Ok(vec![run(1, "2024-03-01T07:00:00Z")])]);
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path().join("out.json"));

        let activities = collect_activities(
            &source,
            &opts,
            TimeWindow::new(100, None),
            false,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap();

        assert_eq!(activities.len(), 1);
        let queries = source.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].after, 100);
        assert_eq!(queries[0].before, Some(NOW));
        assert_eq!(queries[0].per_page, 200);
        assert!(queries[0].only_runs);
    }

    #[tokio::test]
    async fn empty_window_probes_and_refetches_once() {
        let source = ScriptedSource::new(vec![
            Ok(vec![]),
            Ok(vec![run(9, "2024-03-02T18:30:00Z")]),
            Ok(vec![run(9, "2024-03-02T18:30:00Z"), run(8, "2024-03-01T07:00:00Z")]),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path().join("out.json"));
        let tz = utc_minus_5();

        let activities =
            collect_activities(&source, &opts, TimeWindow::new(100, None), false, &tz, NOW)
                .await
                .unwrap();
        assert_eq!(activities.len(), 2);

        let queries = source.queries();
        assert_eq!(queries.len(), 3);

        let probe = queries[1];
        assert_eq!(probe.per_page, 1);
        assert_eq!(probe.max_pages, PROBE_MAX_PAGES);
        assert_eq!(probe.after, 100);
        assert_eq!(probe.only_runs, opts.only_runs);

        let end_of_day = tz
            .with_ymd_and_hms(2024, 3, 3, 0, 0, 0)
            .unwrap()
            .timestamp();
        assert_eq!(queries[2].before, Some(end_of_day));
        assert_eq!(queries[2].per_page, 200);
    }

    #[tokio::test]
    async fn no_fallback_with_explicit_before() {
        let source = ScriptedSource::new(vec![Ok(vec![])]);
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path().join("out.json"));

        let activities = collect_activities(
            &source,
            &opts,
            TimeWindow::new(100, Some(200)),
            true,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap();

        assert!(activities.is_empty());
        assert_eq!(source.queries().len(), 1);
        assert_eq!(source.queries()[0].before, Some(200));
    }

    #[tokio::test]
    async fn empty_probe_returns_empty() {
        let source = ScriptedSource::new(vec![Ok(vec![]), Ok(vec![])]);
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path().join("out.json"));

        let activities = collect_activities(
            &source,
            &opts,
            TimeWindow::new(100, None),
            false,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap();

        assert!(activities.is_empty());
        assert_eq!(source.queries().len(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_writes_nothing() {
        let source = ScriptedSource::new(vec![Err(ApiError::Fetch {
            status: 500,
            body: "boom".into(),
        })]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");

        let err = execute(
            &source,
            &options(out.clone()),
            TimeWindow::new(0, None),
            false,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("500"));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn append_merges_with_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out.json");
        write_json_atomic(
            &out,
            &[
                run(1, "2024-02-01T07:00:00Z"),
                Activity::from_value(json!({"id": 2, "name": "old", "start_date_local": "2024-02-02T07:00:00Z"}))
                    .unwrap(),
            ],
        )
        .unwrap();

        let fresh_two = Activity::from_value(json!({
            "id": 2, "type": "Run", "name": "new", "start_date_local": "2024-02-02T07:00:00Z"
        }))
        .unwrap();
        let source = ScriptedSource::new(vec![Ok(vec![
            run(3, "2024-03-01T07:00:00Z"),
            fresh_two,
        ])]);

        let mut opts = options(out.clone());
        opts.append = true;
        let report = execute(
            &source,
            &opts,
            TimeWindow::new(0, None),
            false,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.written.len(), 3);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let ids: Vec<i64> = written
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(written[1]["name"], "new");
    }

    #[tokio::test]
    async fn append_with_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        std::fs::write(&out, "not json at all").unwrap();

        let source = ScriptedSource::new(vec![Ok(vec![run(1, "2024-03-01T07:00:00Z")])]);
        let mut opts = options(out.clone());
        opts.append = true;

        let report = execute(
            &source,
            &opts,
            TimeWindow::new(0, None),
            false,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap();
        assert_eq!(report.written.len(), 1);
    }

    #[tokio::test]
    async fn overwrite_keeps_api_order_and_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        let no_id = Activity::from_value(json!({
            "type": "Run", "distance": 3000.0, "moving_time": 900,
            "start_date_local": "2024-03-03T07:00:00Z"
        }))
        .unwrap();
        let source = ScriptedSource::new(vec![Ok(vec![
            run(1, "2024-03-01T07:00:00Z"),
            run(2, "2024-03-02T07:00:00Z"),
            no_id,
            run(1, "2024-03-01T07:00:00Z"),
        ])]);

        let report = execute(
            &source,
            &options(out.clone()),
            TimeWindow::new(0, None),
            false,
            &utc_minus_5(),
            NOW,
        )
        .await
        .unwrap();
        assert_eq!(report.fetched, 4);
        assert_eq!(report.written.len(), 4);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let ids: Vec<serde_json::Value> = written
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.get("id").cloned().unwrap_or(serde_json::Value::Null))
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2), serde_json::Value::Null, json!(1)]);
        assert_eq!(written[2]["distance"], 3000.0);

        let rendered = report.render().unwrap();
        assert!(rendered.contains("\"total_activities\": 4"));
    }

    #[test]
    fn options_reject_conflicting_and_malformed_flags() {
        let base = FetchArgs {
            after: None,
            before: None,
            after_epoch: None,
            before_epoch: None,
            per_page: 200,
            max_pages: 10,
            only_runs: false,
            all_types: false,
            out: None,
            append: false,
        };

        let conflicting = FetchArgs {
            after: Some("2024-01-01".into()),
            after_epoch: Some(1),
            ..base
        };
        assert!(FetchOptions::from_args(&conflicting, "x").is_err());

        let malformed = FetchArgs {
            after: Some("01/01/2024".into()),
            after_epoch: None,
            ..conflicting
        };
        let err = FetchOptions::from_args(&malformed, "x").unwrap_err();
        assert!(err.to_string().contains("--after"));

        let ok = FetchArgs {
            after: Some("2024-01-01".into()),
            ..malformed
        };
        let options = FetchOptions::from_args(&ok, "20240101_000000").unwrap();
        assert_eq!(
            options.out,
            PathBuf::from("data/activities_20240101_000000.json")
        );
        assert!(options.only_runs);
        assert!(!options.window.has_explicit_before());
    }

    #[test]
    fn report_rendering() {
        let report = FetchReport {
            fetched: 2,
            written: vec![
                run(1, "2024-03-01T07:00:00Z"),
                run(2, "2024-03-02T07:00:00Z"),
            ],
            path: PathBuf::from("data/out.json"),
            append: false,
            only_runs: true,
        };

        insta::assert_snapshot!(report.render().unwrap(), @r#"
        Fetched 2 new activities (runs only).
        Saved to data/out.json
        Quick summary: {
          "total_activities": 2,
          "total_distance_km": 10.0,
          "total_moving_hours": 0.83,
          "avg_pace_min_per_km": "5:00 min/km",
          "longest_run_km": 5.0,
          "latest_activity_datetime": "2024-03-02T07:00:00Z"
        }
        "#);
    }

    #[test]
    fn report_rendering_append() {
        let report = FetchReport {
            fetched: 0,
            written: vec![run(1, "2024-03-01T07:00:00Z")],
            path: PathBuf::from("runs.json"),
            append: true,
            only_runs: false,
        };
        let rendered = report.render().unwrap();
        assert!(rendered.starts_with(
            "Fetched 0 new activities.\nMerged dataset size: 1 activities -> runs.json\n"
        ));
    }
}
