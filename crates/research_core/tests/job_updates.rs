use chrono::{TimeZone, Utc};
use research_core::{JobCost, JobProgress, JobStatus, JobUpdate, ResearchJob};

fn job() -> ResearchJob {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    ResearchJob::new("job-1", "doc-1", "what are the fees?", "index-a", now)
}

#[test]
fn status_only_moves_forward() {
    let mut job = job();
    let now = Utc::now();
    job.apply(&JobUpdate::status(JobStatus::Running), now).unwrap();
    job.apply(&JobUpdate::status(JobStatus::Completed), now).unwrap();

    let err = job
        .apply(&JobUpdate::status(JobStatus::Running), now)
        .unwrap_err();
    assert_eq!(err.from, JobStatus::Completed);
    assert_eq!(err.to, JobStatus::Running);
    assert_eq!(job.status, JobStatus::Completed);
}

#[test]
fn queued_job_must_run_before_it_can_fail() {
    let mut job = job();
    let now = Utc::now();
    let err = job
        .apply(&JobUpdate::status(JobStatus::Failed).with_error("boom"), now)
        .unwrap_err();
    assert_eq!(err.from, JobStatus::Queued);
    assert_eq!(err.to, JobStatus::Failed);
    assert_eq!(job.error, None);

    job.apply(&JobUpdate::status(JobStatus::Running), now).unwrap();
    job.apply(&JobUpdate::status(JobStatus::Failed).with_error("boom"), now)
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("boom"));
}

#[test]
fn completed_pages_never_decrease_or_exceed_total() {
    let mut job = job();
    let now = Utc::now();
    job.apply(&JobUpdate::default().with_progress(JobProgress::new(6, 10)), now)
        .unwrap();
    job.apply(&JobUpdate::default().with_progress(JobProgress::new(3, 10)), now)
        .unwrap();
    assert_eq!(job.progress.completed_pages, 6);

    job.apply(
        &JobUpdate::default().with_progress(JobProgress {
            completed_pages: 15,
            total_pages: 10,
            percentage: 150.0,
        }),
        now,
    )
    .unwrap();
    assert_eq!(job.progress.completed_pages, 10);
    assert_eq!(job.progress.percentage, 100.0);
}

#[test]
fn cost_is_never_decremented() {
    let mut job = job();
    let now = Utc::now();
    let high = JobCost {
        input_tokens: 1_000,
        output_tokens: 200,
        total_cost: 1.5,
    };
    job.apply(&JobUpdate::default().with_cost(high), now).unwrap();
    job.apply(&JobUpdate::default().with_cost(JobCost::default()), now)
        .unwrap();
    assert_eq!(job.cost, high);
}

#[test]
fn rejected_transition_leaves_record_untouched() {
    let mut job = job();
    let before = job.clone();
    let update = JobUpdate::status(JobStatus::Completed)
        .with_progress(JobProgress::new(4, 4))
        .with_note("done");
    assert!(job.apply(&update, Utc::now()).is_err());
    assert_eq!(job, before);
}
