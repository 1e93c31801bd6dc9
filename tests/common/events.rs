//! Event collection helpers

use std::time::Duration;
use ota_dl::{DownloadState, Event};
use tokio::sync::broadcast;

/// Collect events until `filename` reaches a state that ends the pipeline
///
/// Panics if nothing terminal arrives within `timeout`.
pub async fn collect_until_settled(
    rx: &mut broadcast::Receiver<Event>,
    filename: &str,
    timeout: Duration,
) -> Vec<Event> {
    let mut events = Vec::new();
    let result = tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let settled = matches!(
                        &event,
                        Event::StateChanged { filename: f, state }
                            if f == filename && is_settled(*state)
                    );
                    events.push(event);
                    if settled {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;

    assert!(result.is_ok(), "timed out, events so far: {events:?}");

    // Sink calls that follow the final state change (install ready/revoked, failure)
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        events.push(event);
    }
    events
}

fn is_settled(state: DownloadState) -> bool {
    matches!(
        state,
        DownloadState::Failed
            | DownloadState::VerificationCompleted
            | DownloadState::VerificationFailed
    )
}

/// States `filename` passed through, in order
pub fn states_of(events: &[Event], filename: &str) -> Vec<DownloadState> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::StateChanged { filename: f, state } if f == filename => Some(*state),
            _ => None,
        })
        .collect()
}
