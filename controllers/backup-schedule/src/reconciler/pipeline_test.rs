//! Unit tests for the BackupSchedule reconciler

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crds::time::parse_rfc3339;
    use crds::*;
    use kube::ResourceExt;
    use object_store::{InjectedFailure, MockOp, ResourceStore};
    use reconcile_flow::Flow;
    use tokio_util::sync::CancellationToken;

    use crate::error::ControllerError;
    use crate::test_utils::*;

    const NOW: &str = "2024-06-01T12:00:30Z";

    fn hourly(name: &str) -> BackupSchedule {
        create_test_schedule(name, TEST_NAMESPACE, "0 * * * *")
    }

    fn one_shot(name: &str) -> BackupSchedule {
        create_test_schedule(name, TEST_NAMESPACE, "")
    }

    fn error_reason(status: &BackupScheduleStatus) -> Option<String> {
        find_condition(&status.conditions, CONDITION_ERROR).map(|c| c.reason.clone())
    }

    fn fatal_error(flow: Flow) -> ControllerError {
        match flow {
            Flow::Fatal(err) => ControllerError::from_flow_error(err),
            other => panic!("expected a fatal outcome, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_schedule_is_forgotten() {
        let harness = TestHarness::new();

        let flow = harness.reconcile("ghost", at(NOW)).await;

        assert!(matches!(flow, Flow::Forget));
        assert_eq!(harness.schedules.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_invocation_writes_nothing() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let flow = harness.reconcile_with("nightly", at(NOW), &cancel).await;

        assert!(matches!(flow, Flow::Cancelled));
        assert_eq!(harness.schedules.status_writes(), 0);
        assert!(harness.schedule("nightly").unwrap().finalizers().is_empty());
    }

    #[tokio::test]
    async fn test_first_pass_attaches_finalizer_and_schedules_runs() {
        // Setup
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));

        // Execute
        let flow = harness.reconcile("nightly", at(NOW)).await;

        // Assert: runs computed, immediate requeue to evaluate them
        assert!(matches!(flow, Flow::RequeueNow));
        let schedule = harness.schedule("nightly").unwrap();
        assert!(schedule
            .finalizers()
            .iter()
            .any(|f| f == BACKUP_SCHEDULE_FINALIZER));
        let status = schedule.status.unwrap();
        assert_eq!(status.state, ScheduleState::Active);
        assert_eq!(status.active_schedule, "0 * * * *");
        assert_eq!(
            status.next_run_times,
            vec![
                "2024-06-01T13:00:00Z".to_string(),
                "2024-06-01T14:00:00Z".to_string(),
                "2024-06-01T15:00:00Z".to_string(),
            ]
        );
        assert!(is_condition_true(&status.conditions, CONDITION_READY));

        // Assert: the next pass waits for the first tick
        let flow = harness.reconcile("nightly", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(3570)));
        assert!(harness.backup_names().is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_without_start_runs_now_and_only_once() {
        let harness = TestHarness::new();
        harness.add_schedule(one_shot("adhoc"), at(NOW));

        // First pass schedules a single tick at "now"
        let flow = harness.reconcile("adhoc", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueNow));
        let status = harness.status("adhoc");
        assert_eq!(status.state, ScheduleState::Active);
        assert_eq!(status.next_run_times.len(), 1);
        let tick = parse_rfc3339(&status.next_run_times[0]).unwrap();
        assert!((at(NOW) - tick).num_seconds().abs() <= 1);

        // The tick is acted on and the schedule completes
        let flow = harness.settle("adhoc", at(NOW)).await;
        assert!(matches!(flow, Flow::Forget));
        assert_eq!(harness.backup_names(), vec!["adhoc-1-20240601120030".to_string()]);

        let status = harness.status("adhoc");
        assert_eq!(status.state, ScheduleState::Done);
        assert_eq!(status.backup_index, 1);
        assert_eq!(status.last_create_run, status.last_delete_run);
        assert!(status.next_run_times.is_empty());
        assert_eq!(
            status.last_created_backup.map(|b| b.name),
            Some("adhoc-1-20240601120030".to_string())
        );

        // Later invocations never mint a second backup
        for later in ["2024-06-01T13:00:00Z", "2024-06-02T00:00:00Z", "2025-01-01T00:00:00Z"] {
            let flow = harness.settle("adhoc", at(later)).await;
            assert!(matches!(flow, Flow::Forget));
        }
        assert_eq!(harness.aws.created().len(), 1);
    }

    #[tokio::test]
    async fn test_one_shot_with_future_start_is_pending() {
        let harness = TestHarness::new();
        let mut schedule = one_shot("later");
        schedule.spec.start_time = Some(at("2024-06-01T18:00:00Z"));
        harness.add_schedule(schedule, at(NOW));

        harness.reconcile("later", at(NOW)).await;
        let status = harness.status("later");
        assert_eq!(status.state, ScheduleState::Pending);
        assert_eq!(status.next_run_times, vec!["2024-06-01T18:00:00Z".to_string()]);

        let flow = harness.settle("later", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueAfter(_)));
        assert!(harness.backup_names().is_empty());

        let flow = harness.settle("later", at("2024-06-01T18:00:00Z")).await;
        assert!(matches!(flow, Flow::Forget));
        assert_eq!(harness.backup_names(), vec!["later-1-20240601180000".to_string()]);
        assert_eq!(harness.status("later").state, ScheduleState::Done);
    }

    #[tokio::test]
    async fn test_every_minute_with_start_in_five_days() {
        let harness = TestHarness::new();
        let now = at("2024-06-01T12:00:00Z");
        let mut schedule = create_test_schedule("minutely", TEST_NAMESPACE, "* * * * *");
        schedule.spec.start_time = Some(at("2024-06-06T12:00:00Z"));
        harness.add_schedule(schedule, now);

        harness.reconcile("minutely", now).await;

        let status = harness.status("minutely");
        assert_eq!(status.state, ScheduleState::Pending);
        assert_eq!(
            status.next_run_times,
            vec![
                "2024-06-06T12:00:00Z".to_string(),
                "2024-06-06T12:01:00Z".to_string(),
                "2024-06-06T12:02:00Z".to_string(),
            ]
        );

        let flow = harness.reconcile("minutely", now).await;
        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(5 * 24 * 3600)));
    }

    #[tokio::test]
    async fn test_recurring_tick_creates_one_backup_then_recomputes() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;

        // At the tick: one backup, then the run list moves on
        let tick = at("2024-06-01T13:00:00Z");
        let flow = harness.settle("nightly", tick).await;
        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(3600)));
        assert_eq!(harness.backup_names(), vec!["nightly-1-20240601130000".to_string()]);

        let status = harness.status("nightly");
        assert_eq!(status.state, ScheduleState::Active);
        assert_eq!(status.backup_index, 1);
        assert_eq!(status.backup_count, 1);
        assert_eq!(status.last_create_run.as_deref(), Some("2024-06-01T13:00:00Z"));
        assert_eq!(status.last_delete_run.as_deref(), Some("2024-06-01T13:00:00Z"));
        assert_eq!(
            status.next_run_times,
            vec![
                "2024-06-01T14:00:00Z".to_string(),
                "2024-06-01T15:00:00Z".to_string(),
                "2024-06-01T16:00:00Z".to_string(),
            ]
        );

        // Re-running at the same instant is a no-op
        let writes = harness.schedules.status_writes();
        harness.settle("nightly", tick).await;
        assert_eq!(harness.aws.created().len(), 1);
        assert_eq!(harness.schedules.status_writes(), writes);

        assert!(harness.events.reasons().contains(&"BackupCreated".to_string()));
    }

    #[tokio::test]
    async fn test_schedule_change_recomputes_runs() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;

        harness.schedules.update_object(Some(TEST_NAMESPACE), "nightly", |s| {
            s.spec.schedule = "30 2 * * *".to_string();
        });
        harness.reconcile("nightly", at(NOW)).await;

        let status = harness.status("nightly");
        assert_eq!(status.active_schedule, "30 2 * * *");
        assert_eq!(
            status.next_run_times,
            vec![
                "2024-06-02T02:30:00Z".to_string(),
                "2024-06-03T02:30:00Z".to_string(),
                "2024-06-04T02:30:00Z".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_late_invocation_takes_one_backup_then_skips_ahead() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;

        // The controller was down across several ticks
        let flow = harness.settle("nightly", at("2024-06-01T17:20:00Z")).await;

        assert!(matches!(flow, Flow::RequeueAfter(_)));
        assert_eq!(harness.aws.created().len(), 1);
        let status = harness.status("nightly");
        assert_eq!(status.next_run_times[0], "2024-06-01T18:00:00Z");
    }

    #[tokio::test]
    async fn test_tick_reached_within_tolerance_is_not_recomputed() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;

        // Half a second early, inside the one-second tolerance
        let early = at("2024-06-01T12:59:59.500Z");
        let flow = harness.settle("nightly", early).await;

        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(3601)));
        assert_eq!(harness.backup_names(), vec!["nightly-1-20240601130000".to_string()]);
        let status = harness.status("nightly");
        assert_eq!(status.last_create_run.as_deref(), Some("2024-06-01T13:00:00Z"));
        assert_eq!(status.next_run_times[0], "2024-06-01T14:00:00Z");

        // Once the clock passes the tick nothing else happens
        let writes = harness.schedules.status_writes();
        harness.settle("nightly", at("2024-06-01T13:00:01Z")).await;
        assert_eq!(harness.aws.created().len(), 1);
        assert_eq!(harness.schedules.status_writes(), writes);
    }

    #[tokio::test]
    async fn test_suspended_schedule_clears_runs_and_stays_quiet() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;

        harness.schedules.update_object(Some(TEST_NAMESPACE), "nightly", |s| {
            s.spec.suspend = true;
        });
        let flow = harness.reconcile("nightly", at(NOW)).await;

        assert!(matches!(flow, Flow::Forget));
        let status = harness.status("nightly");
        assert_eq!(status.state, ScheduleState::Suspended);
        assert!(status.next_run_times.is_empty());
        assert!(status.next_delete_times.is_empty());

        let writes = harness.schedules.status_writes();
        let flow = harness.reconcile("nightly", at("2024-06-01T13:00:00Z")).await;
        assert!(matches!(flow, Flow::Forget));
        assert_eq!(harness.schedules.status_writes(), writes);
        assert!(harness.backup_names().is_empty());
    }

    #[tokio::test]
    async fn test_passed_end_time_completes_schedule() {
        let harness = TestHarness::new();
        let mut schedule = hourly("expired");
        schedule.spec.end_time = Some(at("2024-06-01T11:00:00Z"));
        harness.add_schedule(schedule, at("2024-05-01T00:00:00Z"));

        let flow = harness.reconcile("expired", at(NOW)).await;

        assert!(matches!(flow, Flow::Forget));
        let status = harness.status("expired");
        assert_eq!(status.state, ScheduleState::Done);
        assert!(status.next_run_times.is_empty());
        assert_eq!(
            find_condition(&status.conditions, CONDITION_READY).map(|c| c.reason.as_str()),
            Some("EndTimeReached")
        );
    }

    #[tokio::test]
    async fn test_invalid_cron_is_a_permanent_user_error() {
        let harness = TestHarness::new();
        harness.add_schedule(create_test_schedule("bad", TEST_NAMESPACE, "every tuesday"), at(NOW));

        let flow = harness.reconcile("bad", at(NOW)).await;

        assert!(matches!(flow, Flow::Forget));
        let status = harness.status("bad");
        assert_eq!(status.state, ScheduleState::Error);
        assert_eq!(error_reason(&status).as_deref(), Some("InvalidSchedule"));
        assert!(!is_condition_true(&status.conditions, CONDITION_READY));

        let writes = harness.schedules.status_writes();
        harness.reconcile("bad", at(NOW)).await;
        assert_eq!(harness.schedules.status_writes(), writes);
    }

    #[tokio::test]
    async fn test_broken_cron_drops_runs_and_expiries() {
        let harness = TestHarness::new();
        let mut schedule = hourly("nightly");
        schedule.spec.max_retention_days = 7;
        harness.add_schedule(schedule, at(NOW));
        harness.settle("nightly", at(NOW)).await;
        harness.settle("nightly", at("2024-06-01T13:00:00Z")).await;
        assert!(!harness.status("nightly").next_delete_times.is_empty());

        harness.schedules.update_object(Some(TEST_NAMESPACE), "nightly", |s| {
            s.spec.schedule = "every tuesday".to_string();
        });
        let flow = harness.reconcile("nightly", at("2024-06-01T13:10:00Z")).await;

        assert!(matches!(flow, Flow::Forget));
        let status = harness.status("nightly");
        assert_eq!(status.state, ScheduleState::Error);
        assert!(status.next_run_times.is_empty());
        assert!(status.next_delete_times.is_empty());
    }

    #[tokio::test]
    async fn test_start_before_creation_is_rejected() {
        let harness = TestHarness::new();
        let mut schedule = hourly("backdated");
        schedule.spec.start_time = Some(at("2024-05-01T00:00:00Z"));
        harness.add_schedule(schedule, at(NOW));

        let flow = harness.reconcile("backdated", at(NOW)).await;

        assert!(matches!(flow, Flow::Forget));
        let status = harness.status("backdated");
        assert_eq!(status.state, ScheduleState::Error);
        assert_eq!(error_reason(&status).as_deref(), Some("InvalidStartTime"));
    }

    #[tokio::test]
    async fn test_end_before_start_is_rejected() {
        let harness = TestHarness::new();
        let mut schedule = hourly("inverted");
        schedule.spec.start_time = Some(at("2024-06-10T00:00:00Z"));
        schedule.spec.end_time = Some(at("2024-06-05T00:00:00Z"));
        harness.add_schedule(schedule, at(NOW));

        harness.reconcile("inverted", at(NOW)).await;

        assert_eq!(error_reason(&harness.status("inverted")).as_deref(), Some("InvalidEndTime"));
    }

    #[tokio::test]
    async fn test_unready_source_retries_then_recovers() {
        let harness = TestHarness::new();
        harness.shares.insert(&create_test_share("data", TEST_NAMESPACE, false));
        harness.add_schedule(one_shot("adhoc"), at(NOW));
        harness.reconcile("adhoc", at(NOW)).await;

        // Source not ready: Error state and a fixed retry delay
        let flow = harness.reconcile("adhoc", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(30)));
        let status = harness.status("adhoc");
        assert_eq!(status.state, ScheduleState::Error);
        assert_eq!(error_reason(&status).as_deref(), Some("SourceNotReady"));
        assert!(harness.backup_names().is_empty());

        // Source becomes ready: the pending tick is taken
        harness.shares.insert(&create_test_share("data", TEST_NAMESPACE, true));
        let flow = harness.settle("adhoc", at("2024-06-01T12:01:00Z")).await;
        assert!(matches!(flow, Flow::Forget));
        assert_eq!(harness.backup_names().len(), 1);
        let status = harness.status("adhoc");
        assert_eq!(status.state, ScheduleState::Done);
        assert_eq!(error_reason(&status), None);
    }

    #[tokio::test]
    async fn test_missing_source_and_scope_are_reported() {
        let harness = TestHarness::new();
        harness.shares.remove(Some(TEST_NAMESPACE), "data");
        harness.add_schedule(one_shot("adhoc"), at(NOW));
        harness.reconcile("adhoc", at(NOW)).await;

        harness.reconcile("adhoc", at(NOW)).await;
        assert_eq!(error_reason(&harness.status("adhoc")).as_deref(), Some("SourceNotFound"));

        harness.scopes.remove(None, "default");
        let flow = harness.reconcile("adhoc", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(30)));
        assert_eq!(error_reason(&harness.status("adhoc")).as_deref(), Some("ScopeNotFound"));
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_fatal_and_permanent() {
        let harness = TestHarness::with_provider(CloudProvider::Unsupported);
        harness.add_schedule(one_shot("adhoc"), at(NOW));
        harness.reconcile("adhoc", at(NOW)).await;

        let flow = harness.reconcile("adhoc", at(NOW)).await;

        let err = fatal_error(flow);
        assert!(matches!(err, ControllerError::UnsupportedProvider(_)));
        assert!(err.is_permanent());
        let status = harness.status("adhoc");
        assert_eq!(status.state, ScheduleState::Error);
        assert_eq!(error_reason(&status).as_deref(), Some("UnsupportedProvider"));
    }

    #[tokio::test]
    async fn test_gcp_scope_creates_gcp_backups() {
        let harness = TestHarness::with_provider(CloudProvider::Gcp);
        let mut schedule = one_shot("adhoc");
        schedule.spec.location = Some("europe-west1".to_string());
        harness.add_schedule(schedule, at(NOW));

        harness.settle("adhoc", at(NOW)).await;

        assert!(harness.aws.is_empty());
        let backups = harness.gcp.all();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].spec.location.as_deref(), Some("europe-west1"));
        assert_eq!(
            harness.status("adhoc").last_created_backup.map(|b| b.kind),
            Some("GcpBackup".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_failure_backs_off_and_keeps_tick() {
        let harness = TestHarness::new();
        harness.add_schedule(one_shot("adhoc"), at(NOW));
        harness.reconcile("adhoc", at(NOW)).await;
        harness.aws.fail_next(MockOp::Create, InjectedFailure::Backend);

        let flow = harness.reconcile("adhoc", at(NOW)).await;

        // Handed to the error policy for backoff, not requeued immediately
        let err = fatal_error(flow);
        assert!(matches!(err, ControllerError::Store(_)));
        assert!(!err.is_permanent());
        let status = harness.status("adhoc");
        assert_eq!(status.state, ScheduleState::Active);
        assert_eq!(error_reason(&status).as_deref(), Some("CreateBackupFailed"));
        assert!(status.last_create_run.is_none());
        assert_eq!(status.backup_index, 0);

        // Retry under the same name succeeds and clears the error
        let flow = harness.settle("adhoc", at(NOW)).await;
        assert!(matches!(flow, Flow::Forget));
        assert_eq!(harness.backup_names(), vec!["adhoc-1-20240601120030".to_string()]);
        assert_eq!(error_reason(&harness.status("adhoc")), None);
    }

    #[tokio::test]
    async fn test_list_failure_backs_off() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;
        harness.aws.fail_next(MockOp::List, InjectedFailure::Backend);

        let flow = harness.reconcile("nightly", at("2024-06-01T13:00:00Z")).await;

        assert!(matches!(fatal_error(flow), ControllerError::Store(_)));
        assert_eq!(error_reason(&harness.status("nightly")).as_deref(), Some("ListBackupsFailed"));
        assert!(harness.aws.created().is_empty());
    }

    #[tokio::test]
    async fn test_retention_delete_failure_backs_off_and_retries_the_tick() {
        let harness = TestHarness::new();
        let mut schedule = hourly("nightly");
        schedule.spec.max_retention_days = 7;
        harness.add_schedule(schedule, at("2024-05-01T00:00:00Z"));
        harness.add_backup(create_test_backup("nightly-old", "nightly", BackupState::Ready, "2024-05-20T13:00:00Z"));
        harness.settle("nightly", at(NOW)).await;
        harness.aws.fail_next(MockOp::Delete, InjectedFailure::Backend);

        let tick = at("2024-06-01T13:00:00Z");
        let mut flow = harness.reconcile("nightly", tick).await;
        while matches!(flow, Flow::RequeueNow) {
            flow = harness.reconcile("nightly", tick).await;
        }

        let err = fatal_error(flow);
        assert!(matches!(err, ControllerError::Store(_)));
        let status = harness.status("nightly");
        assert_eq!(error_reason(&status).as_deref(), Some("DeleteBackupFailed"));
        assert!(status.last_delete_run.is_none());
        assert!(harness.backup_names().contains(&"nightly-old".to_string()));

        // The retry finishes the same tick
        harness.settle("nightly", tick).await;
        assert_eq!(harness.aws.deleted(), vec!["team-a/nightly-old".to_string()]);
        assert_eq!(harness.status("nightly").last_delete_run.as_deref(), Some("2024-06-01T13:00:00Z"));
    }

    #[tokio::test]
    async fn test_existing_backup_from_lost_write_is_adopted() {
        let harness = TestHarness::new();
        harness.add_schedule(one_shot("adhoc"), at(NOW));
        harness.reconcile("adhoc", at(NOW)).await;
        harness.add_backup(create_test_backup(
            "adhoc-1-20240601120030",
            "adhoc",
            BackupState::Creating,
            NOW,
        ));

        harness.settle("adhoc", at(NOW)).await;

        assert_eq!(harness.aws.len(), 1);
        assert!(harness.aws.created().is_empty());
        let status = harness.status("adhoc");
        assert_eq!(status.backup_index, 1);
        assert_eq!(status.last_create_run.as_deref(), Some("2024-06-01T12:00:30Z"));
        assert_eq!(status.backup_count, 1);
    }

    #[tokio::test]
    async fn test_age_retention_deletes_expired_backups() {
        // Setup: two backups, one older than the retention window
        let harness = TestHarness::new();
        let mut schedule = hourly("nightly");
        schedule.spec.max_retention_days = 7;
        harness.add_schedule(schedule, at("2024-05-01T00:00:00Z"));
        harness.add_backup(create_test_backup("nightly-old", "nightly", BackupState::Ready, "2024-05-20T13:00:00Z"));
        harness.add_backup(create_test_backup("nightly-young", "nightly", BackupState::Ready, "2024-05-31T13:00:00Z"));
        harness.settle("nightly", at(NOW)).await;

        // Execute: act on the 13:00 tick
        harness.settle("nightly", at("2024-06-01T13:00:00Z")).await;

        // Assert
        assert_eq!(
            harness.backup_names(),
            vec!["nightly-1-20240601130000".to_string(), "nightly-young".to_string()]
        );
        let status = harness.status("nightly");
        assert_eq!(
            status
                .last_deleted_backups
                .iter()
                .map(|b| b.name.as_str())
                .collect::<Vec<_>>(),
            vec!["nightly-old"]
        );
        assert_eq!(status.backup_count, 2);
        assert_eq!(
            status.next_delete_times.get("nightly-young").map(String::as_str),
            Some("2024-06-07T13:00:00Z")
        );
        assert_eq!(
            status.next_delete_times.get("nightly-1-20240601130000").map(String::as_str),
            Some("2024-06-08T13:00:00Z")
        );
        assert!(harness.events.reasons().contains(&"BackupDeleted".to_string()));
    }

    #[tokio::test]
    async fn test_count_retention_keeps_newest_ready_backups() {
        let harness = TestHarness::new();
        let mut schedule = hourly("nightly");
        schedule.spec.max_retention_days = 30;
        schedule.spec.max_ready_backups = 2;
        harness.add_schedule(schedule, at("2024-05-01T00:00:00Z"));
        harness.add_backup(create_test_backup("nightly-a", "nightly", BackupState::Ready, "2024-05-29T13:00:00Z"));
        harness.add_backup(create_test_backup("nightly-b", "nightly", BackupState::Ready, "2024-05-30T13:00:00Z"));
        harness.add_backup(create_test_backup("nightly-c", "nightly", BackupState::Failed, "2024-05-31T13:00:00Z"));
        harness.settle("nightly", at(NOW)).await;

        // The new backup is still Creating, so only the two Ready ones count
        harness.settle("nightly", at("2024-06-01T13:00:00Z")).await;
        assert!(harness.aws.deleted().is_empty());

        harness.aws.update_object(Some(TEST_NAMESPACE), "nightly-1-20240601130000", |b| {
            b.status = Some(ProviderBackupStatus {
                state: BackupState::Ready,
                ..Default::default()
            });
        });
        harness.settle("nightly", at("2024-06-01T14:00:00Z")).await;

        assert_eq!(harness.aws.deleted(), vec!["team-a/nightly-a".to_string()]);
        assert!(harness.backup_names().contains(&"nightly-c".to_string()));
        assert_eq!(harness.status("nightly").backup_count, 4);
    }

    #[tokio::test]
    async fn test_backups_of_other_schedules_are_untouched() {
        let harness = TestHarness::new();
        let mut schedule = hourly("nightly");
        schedule.spec.max_retention_days = 1;
        harness.add_schedule(schedule, at("2024-05-01T00:00:00Z"));
        harness.add_backup(create_test_backup("weekly-old", "weekly", BackupState::Ready, "2024-01-01T00:00:00Z"));
        harness.settle("nightly", at(NOW)).await;

        harness.settle("nightly", at("2024-06-01T13:00:00Z")).await;

        assert!(harness.aws.deleted().is_empty());
        assert!(harness.backup_names().contains(&"weekly-old".to_string()));
    }

    #[tokio::test]
    async fn test_deletion_without_cascade_releases_finalizer() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.add_backup(create_test_backup("nightly-a", "nightly", BackupState::Ready, NOW));
        harness.settle("nightly", at(NOW)).await;

        harness.schedules.delete(Some(TEST_NAMESPACE), "nightly").await.unwrap();
        let flow = harness.reconcile("nightly", at(NOW)).await;

        assert!(matches!(flow, Flow::Forget));
        assert!(harness.schedule("nightly").is_none());
        assert_eq!(harness.backup_names(), vec!["nightly-a".to_string()]);
    }

    #[tokio::test]
    async fn test_backoff_state_is_dropped_with_the_schedule() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.settle("nightly", at(NOW)).await;
        harness.reconciler.increment_error("team-a/nightly");
        harness.reconciler.increment_error("team-a/ghost");
        assert_eq!(harness.reconciler.tracked_resources(), 2);

        harness.schedules.delete(Some(TEST_NAMESPACE), "nightly").await.unwrap();
        harness.reconcile("nightly", at(NOW)).await;
        assert_eq!(harness.reconciler.tracked_resources(), 1);

        harness.reconcile("ghost", at(NOW)).await;
        assert_eq!(harness.reconciler.tracked_resources(), 0);
    }

    #[tokio::test]
    async fn test_cascade_waits_for_backups_before_releasing_finalizer() {
        // Setup: two backups guarded by their own finalizer
        let harness = TestHarness::new();
        let mut schedule = hourly("nightly");
        schedule.spec.delete_cascade = true;
        harness.add_schedule(schedule, at(NOW));
        for name in ["nightly-a", "nightly-b"] {
            let mut backup = create_test_backup(name, "nightly", BackupState::Ready, NOW);
            backup.finalizers_mut().push("storage.microscaler.io/backup".to_string());
            harness.add_backup(backup);
        }
        harness.settle("nightly", at(NOW)).await;
        harness.schedules.delete(Some(TEST_NAMESPACE), "nightly").await.unwrap();

        // Execute: deletion requested for both, schedule stays
        let flow = harness.reconcile("nightly", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueAfter(d) if d == Duration::from_secs(5)));
        assert_eq!(harness.aws.deleted().len(), 2);
        let status = harness.status("nightly");
        assert_eq!(status.state, ScheduleState::Deleting);
        assert!(status.next_run_times.is_empty());

        // Still present: keep polling without re-requesting
        let flow = harness.reconcile("nightly", at(NOW)).await;
        assert!(matches!(flow, Flow::RequeueAfter(_)));
        assert_eq!(harness.aws.deleted().len(), 2);
        assert!(harness.schedule("nightly").is_some());

        // Backups gone: finalizer released and the schedule disappears
        harness.aws.remove(Some(TEST_NAMESPACE), "nightly-a");
        harness.aws.remove(Some(TEST_NAMESPACE), "nightly-b");
        let flow = harness.reconcile("nightly", at(NOW)).await;
        assert!(matches!(flow, Flow::Forget));
        assert!(harness.schedule("nightly").is_none());
    }

    #[tokio::test]
    async fn test_status_conflict_is_retried_against_fresh_copy() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness
            .schedules
            .fail_next(MockOp::PatchStatus, InjectedFailure::Conflict);

        let flow = harness.reconcile("nightly", at(NOW)).await;

        assert!(matches!(flow, Flow::RequeueNow));
        assert_eq!(harness.schedules.status_writes(), 1);
        assert_eq!(harness.status("nightly").next_run_times.len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_status_conflicts_are_fatal() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        for _ in 0..3 {
            harness
                .schedules
                .fail_next(MockOp::PatchStatus, InjectedFailure::Conflict);
        }

        let flow = harness.reconcile("nightly", at(NOW)).await;

        let err = fatal_error(flow);
        assert!(matches!(err, ControllerError::StatusConflict(_)));
        assert!(!err.is_permanent());
        assert_eq!(harness.schedules.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_finalizer_conflict_requeues() {
        let harness = TestHarness::new();
        harness.add_schedule(hourly("nightly"), at(NOW));
        harness.schedules.fail_next(MockOp::Patch, InjectedFailure::Conflict);

        let flow = harness.reconcile("nightly", at(NOW)).await;

        assert!(matches!(flow, Flow::RequeueNow));
        assert_eq!(harness.schedules.status_writes(), 0);
    }

    #[tokio::test]
    async fn test_outcomes_are_counted() {
        let harness = TestHarness::new();
        harness.add_schedule(one_shot("adhoc"), at(NOW));

        harness.settle("adhoc", at(NOW)).await;

        let rendered = harness.reconciler.metrics().render().unwrap();
        assert!(rendered.contains("backup_schedule_reconciliations_total{outcome=\"forget\"} 1"));
        assert!(rendered.contains("backup_schedule_backups_created_total 1"));
    }
}
