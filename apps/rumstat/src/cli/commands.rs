//! # CLI Command Implementations

use rumstat::api;
use rumstat::config::RumConfig;
use rumstat::input::read_bundles;
use rumstat_core::reports::{ExperimentReport, RageClickPage, UrlGroupRow};
use rumstat_core::{
    FacetQuery, FacetResult, Report, ReportKind, RumError, WelchTest, run_facets,
    run_report, welch_t_test,
};
use std::path::Path;

fn print_json(value: &impl serde::Serialize) -> Result<(), RumError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| RumError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

pub async fn cmd_server(config: RumConfig) -> Result<(), RumError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    println!("rumstat HTTP server starting...");
    println!();
    println!("Configuration:");
    println!("  Address:     {}", addr);
    println!("  Rate limit:  {}/s", config.server.rate_limit);
    println!("  Body limit:  {} bytes", config.server.body_limit_bytes);
    println!("  URL groups:  {}", config.url_groups.len());
    println!();
    println!("Endpoints:");
    println!("  POST /report/{{kind}} - Run a report");
    println!("  POST /facets        - Compute facets");
    println!("  POST /confidence    - Welch's t-test");
    println!("  GET  /health        - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&addr, config).await
}

// =============================================================================
// REPORT COMMAND
// =============================================================================

/// Run one report over a bundle file and print it.
pub fn cmd_report(
    config: &RumConfig,
    json_mode: bool,
    kind: ReportKind,
    file: &Path,
) -> Result<(), RumError> {
    tracing::info!("Running {} report over {:?}", kind, file);

    let bundles = read_bundles(file)?;
    let report = run_report(kind, bundles, &config.report_options())?;

    if json_mode {
        return print_json(&report);
    }

    match &report {
        Report::Experiment(r) => print_experiments(r),
        Report::RageClick(r) => print_rage_clicks(r),
        Report::UrlGroups(r) => print_url_groups(r),
    }
    Ok(())
}

fn print_experiments(report: &ExperimentReport) {
    if report.is_empty() {
        println!("No experiments found");
        return;
    }
    for (page, experiments) in report {
        println!("{}", page);
        for experiment in experiments {
            println!("  Experiment: {}", experiment.experiment);
            for variant in &experiment.variants {
                let confidence = variant
                    .confidence
                    .map_or_else(|| "-".to_string(), |c| format!("{:.2}%", c));
                let marker = if variant.significant == Some(true) {
                    " *"
                } else {
                    ""
                };
                println!(
                    "    {:<16} views {:>10.0}  interactions {:>8.0}  confidence {}{}",
                    variant.name, variant.views, variant.interactions_count, confidence, marker
                );
            }
        }
    }
}

fn print_rage_clicks(pages: &[RageClickPage]) {
    if pages.is_empty() {
        println!("No rage clicks above threshold");
        return;
    }
    for page in pages {
        println!(
            "{}  ({:.0} views, {} samples, {:.2}% avg)",
            page.page, page.page_views, page.samples, page.average_percentage
        );
        for metric in &page.metrics {
            println!(
                "  {:<40} {:>6.2}%  mobile {:>4}  desktop {:>4}",
                metric.selector, metric.percentage, metric.mobile_samples, metric.desktop_samples
            );
        }
    }
}

fn print_url_groups(rows: &[UrlGroupRow]) {
    if rows.is_empty() {
        println!("No web-vitals measurements");
        return;
    }
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
    for row in rows {
        match row {
            UrlGroupRow::Group {
                name,
                pattern,
                pageviews,
                metrics,
            } => {
                println!("[group] {} ({})  {:.0} views", name, pattern, pageviews);
                for device in metrics {
                    println!(
                        "    {:<10} lcp {:>8}  cls {:>6}  inp {:>6}  ttfb {:>6}",
                        device.device_type,
                        fmt(device.metrics.lcp),
                        fmt(device.metrics.cls),
                        fmt(device.metrics.inp),
                        fmt(device.metrics.ttfb)
                    );
                }
            }
            UrlGroupRow::Url {
                url,
                pageviews,
                metrics,
            } => {
                println!(
                    "[url]   {}  {:.0} views  lcp {}  cls {}  inp {}  ttfb {}",
                    url,
                    pageviews,
                    fmt(metrics.lcp),
                    fmt(metrics.cls),
                    fmt(metrics.inp),
                    fmt(metrics.ttfb)
                );
            }
        }
    }
}

// =============================================================================
// FACETS COMMAND
// =============================================================================

/// Facet a bundle file by built-in extractors.
pub fn cmd_facets(
    json_mode: bool,
    file: &Path,
    facets: Vec<String>,
    series: Vec<String>,
    top: usize,
) -> Result<(), RumError> {
    let bundles = read_bundles(file)?;
    let result = run_facets(bundles, &FacetQuery { facets, series })?;

    if json_mode {
        return print_json(&result);
    }
    print_facets(&result, top);
    Ok(())
}

fn print_facets(result: &FacetResult, top: usize) {
    println!("Bundles: {}", result.bundles);
    for (name, aggregate) in &result.totals {
        println!(
            "  {:<12} sum {:>12.2}  count {:>8}",
            name, aggregate.sum, aggregate.count
        );
    }

    for (name, values) in &result.facets {
        println!();
        println!("{} ({} values)", name, values.len());
        for value in values.iter().take(top) {
            println!(
                "  {:<48} weight {:>10.0}  bundles {:>6}",
                value.value, value.weight, value.count
            );
        }
    }
}

// =============================================================================
// CONFIDENCE COMMAND
// =============================================================================

/// Score two arms with Welch's t-test.
pub fn cmd_confidence(
    json_mode: bool,
    control_conversions: f64,
    control_samples: f64,
    test_conversions: f64,
    test_samples: f64,
) {
    let test = welch_t_test(
        control_conversions,
        control_samples,
        test_conversions,
        test_samples,
    );
    let significant = test.is_some_and(|t| t.is_significant());

    if json_mode {
        let confidence = test.map_or(0.0, |t| t.confidence);
        let output = serde_json::json!({
            "confidence": confidence,
            "significant": significant,
            "details": test,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return;
    }

    match test {
        Some(WelchTest {
            control_rate,
            test_rate,
            t_stat,
            p_value,
            confidence,
            ..
        }) => {
            println!("Control rate: {:.4}", control_rate);
            println!("Test rate:    {:.4}", test_rate);
            println!("t statistic:  {:.4}", t_stat);
            if let Some(p) = p_value {
                println!("p-value:      {:.6}", p);
            }
            println!("Confidence:   {:.2}%", confidence);
            println!(
                "Significant:  {}",
                if significant { "yes" } else { "no" }
            );
        }
        None => {
            println!("Confidence:   0.00%");
            println!("Not enough samples to compare");
        }
    }
}
