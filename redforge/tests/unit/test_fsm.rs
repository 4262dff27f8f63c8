//! FSM tests

use redforge::deploy::fsm::{next_status, DeploymentEvent, DeploymentStatus};

fn walk(start: DeploymentStatus, events: &[DeploymentEvent]) -> Result<DeploymentStatus, String> {
    events
        .iter()
        .try_fold(start, |status, event| next_status(status, *event))
}

#[test]
fn test_fsm_full_lifecycle() {
    let status = walk(
        DeploymentStatus::ReadyToPrepare,
        &[
            DeploymentEvent::Prepare,
            DeploymentEvent::PrepareSuccess,
            DeploymentEvent::Deploy,
            DeploymentEvent::DeploySuccess,
            DeploymentEvent::Configure,
            DeploymentEvent::ConfigureSuccess,
            DeploymentEvent::Destroy,
            DeploymentEvent::DestroySuccess,
        ],
    )
    .unwrap();
    assert_eq!(status, DeploymentStatus::Destroyed);
    assert!(status.can_delete());
}

#[test]
fn test_fsm_failure_then_retry() {
    let status = walk(
        DeploymentStatus::ReadyToPrepare,
        &[DeploymentEvent::Prepare, DeploymentEvent::Fail],
    )
    .unwrap();
    assert_eq!(status, DeploymentStatus::Failed);

    // Any stage may be retried from failed
    for (event, running) in [
        (DeploymentEvent::Prepare, DeploymentStatus::Preparing),
        (DeploymentEvent::Deploy, DeploymentStatus::Deploying),
        (DeploymentEvent::Configure, DeploymentStatus::Configuring),
        (DeploymentEvent::Destroy, DeploymentStatus::Destroying),
    ] {
        assert_eq!(next_status(DeploymentStatus::Failed, event).unwrap(), running);
    }
}

#[test]
fn test_fsm_destroy_from_every_live_status() {
    for status in [
        DeploymentStatus::ReadyToPrepare,
        DeploymentStatus::Preparing,
        DeploymentStatus::ReadyToDeploy,
        DeploymentStatus::Deploying,
        DeploymentStatus::ReadyToConfigure,
        DeploymentStatus::Configuring,
        DeploymentStatus::Live,
        DeploymentStatus::Failed,
    ] {
        assert_eq!(
            next_status(status, DeploymentEvent::Destroy).unwrap(),
            DeploymentStatus::Destroying,
            "destroy from {}",
            status
        );
    }
}

#[test]
fn test_fsm_destroyed_is_terminal() {
    for event in [
        DeploymentEvent::Prepare,
        DeploymentEvent::Deploy,
        DeploymentEvent::Configure,
        DeploymentEvent::Destroy,
        DeploymentEvent::Fail,
    ] {
        assert!(next_status(DeploymentStatus::Destroyed, event).is_err());
    }
}

#[test]
fn test_fsm_configure_requires_deploy() {
    assert!(next_status(DeploymentStatus::ReadyToDeploy, DeploymentEvent::Configure).is_err());
    assert!(next_status(DeploymentStatus::ReadyToPrepare, DeploymentEvent::Configure).is_err());
}
