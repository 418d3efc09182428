use std::fs;
use std::path::PathBuf;

use chrono::Local;
use serde_json::json;
use streamscout_core::capture::JobCaptures;
use streamscout_core::error::AppError;
use streamscout_core::executor::Exporter;
use streamscout_core::job::ScanJob;

/// Writes the per-site capture mapping to a timestamped JSON file under
/// the results directory.
pub struct JsonExporter {
    results_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }
}

impl Exporter for JsonExporter {
    fn export(&self, job: &ScanJob, captures: &JobCaptures) -> Result<(), AppError> {
        fs::create_dir_all(&self.results_dir)
            .map_err(|e| AppError::Export(format!("Cannot create results dir: {e}")))?;

        let now = Local::now();
        let sites: serde_json::Map<String, serde_json::Value> = captures
            .iter()
            .map(|(site, set)| (site.to_string(), json!(set.urls().collect::<Vec<_>>())))
            .collect();
        let body = json!({
            "job_id": job.job_id,
            "run_at": job.run_at.format("%Y-%m-%d %H:%M").to_string(),
            "generated_at": now.format("%Y-%m-%d %H:%M:%S").to_string(),
            "total_urls": captures.total_urls(),
            "sites": sites,
        });

        let path = self
            .results_dir
            .join(format!("{}_{}.json", job.job_id, now.format("%Y%m%d_%H%M%S")));
        fs::write(&path, serde_json::to_vec_pretty(&body)?)
            .map_err(|e| AppError::Export(format!("Cannot write {}: {e}", path.display())))?;

        tracing::info!(
            job_id = %job.job_id,
            urls = captures.total_urls(),
            file = %path.display(),
            "Results exported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use streamscout_core::capture::CaptureSet;
    use streamscout_core::testutil::future_job;

    use super::*;

    #[test]
    fn test_export_writes_site_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = JsonExporter::new(dir.path());
        let job = future_job("job_exp");

        let mut captures = JobCaptures::new();
        let mut set = CaptureSet::new();
        set.insert("https://cdn.test/live/a.m3u8?token=1");
        set.insert("https://cdn.test/live/b.m3u8");
        captures.merge_site("https://site-one.test", &set);
        captures.merge_site("https://site-two.test", &CaptureSet::new());

        exporter.export(&job, &captures).unwrap();

        let entry = fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("job_exp_"));
        assert!(name.ends_with(".json"));

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(entry.path()).unwrap()).unwrap();
        assert_eq!(parsed["job_id"], "job_exp");
        assert_eq!(parsed["total_urls"], 2);
        assert_eq!(
            parsed["sites"]["https://site-one.test"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
        // Sites that captured nothing still appear, with an empty list.
        assert_eq!(
            parsed["sites"]["https://site-two.test"]
                .as_array()
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn test_export_to_unwritable_dir_fails() {
        let exporter = JsonExporter::new("/proc/streamscout-results");
        let err = exporter
            .export(&future_job("job_exp"), &JobCaptures::new())
            .unwrap_err();
        assert!(matches!(err, AppError::Export(_)));
    }
}
