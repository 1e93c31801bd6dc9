use super::test_helpers::*;
use super::*;
use crate::error::DownloadError;
use crate::test_helpers::{Recorded, ScriptedFetcher, Step, descriptor, payload};
use crate::types::DownloadDescriptor;

mod control;

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

fn verified_descriptor(filename: &str, data: &[u8]) -> DownloadDescriptor {
    descriptor(filename, data.len() as u64, Some(&md5_hex(data)))
}

fn states(records: &[Recorded]) -> Vec<DownloadState> {
    records
        .iter()
        .filter_map(|r| match r {
            Recorded::State(s) => Some(*s),
            _ => None,
        })
        .collect()
}

async fn wait_for_checkpoint(downloader: &UpdateDownloader, filename: &str, value: u64) {
    for _ in 0..500 {
        if downloader.db.get_checkpoint(filename).await.unwrap() == Some(value) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("checkpoint for {filename} never reached {value}");
}
