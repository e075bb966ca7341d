use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::reports::EvaluationReport;

/// Serializes a value to JSON and uploads it to an S3 bucket with
/// `application/json` content type.
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
) -> Result<()> {
    let body = serde_json::to_vec(value)?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(body.into())
        .content_type("application/json")
        .send()
        .await
        .with_context(|| format!("uploading s3://{bucket}/{key}"))?;

    Ok(())
}

/// Uploads a local file as-is under `prefix/<file name>`.
pub async fn upload_file(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
    path: &Path,
) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no file name in {}", path.display()))?;
    let key = format!("{}/{}", prefix.trim_end_matches('/'), name);
    let body = tokio::fs::read(path).await?;

    client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(body))
        .send()
        .await
        .with_context(|| format!("uploading s3://{bucket}/{key}"))?;

    Ok(key)
}

/// `reports/rule_id=<id>/day=<YYYY-MM-DD>.json`
pub fn report_key(report: &EvaluationReport) -> String {
    format!(
        "reports/rule_id={}/day={}.json",
        report.rule_id(),
        report.execution_day().format("%Y-%m-%d")
    )
}

/// Uploads every report as JSON; returns how many were written.
pub async fn publish_reports(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    reports: &[EvaluationReport],
) -> Result<usize> {
    for report in reports {
        write_json_to_s3(client, bucket, &report_key(report), report).await?;
    }
    info!(bucket, count = reports.len(), "Reports published");
    Ok(reports.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::RuleEvaluationResult;
    use chrono::NaiveDate;

    #[test]
    fn test_report_key() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let report = EvaluationReport::new(12, &RuleEvaluationResult::empty("r", day, day), 6.0);
        assert_eq!(report_key(&report), "reports/rule_id=12/day=2025-03-04.json");
    }
}
