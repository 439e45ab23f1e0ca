//! File regions streamed through a recording transport.

use std::{io, path::PathBuf, sync::Arc};

use futures::future::try_join_all;
use rstest::rstest;
use tokio::fs::File;
use wirechain::{
    file_region::{FileRegion, TRANSFER_CHUNK},
    transport::{Transport, WriteFlags},
};
use wirechain_testing::RecordingTransport;

/// File under the system temp directory, removed on drop.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    async fn with_contents(name: &str, contents: &[u8]) -> Self {
        let path = std::env::temp_dir().join(format!("wirechain-{}-{name}", std::process::id()));
        tokio::fs::write(&path, contents).await.expect("write temp file");
        Self { path }
    }

    async fn region(&self, offset: u64, count: u64) -> FileRegion {
        let file = File::open(&self.path).await.expect("open temp file");
        FileRegion::new(file, offset, count)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) { let _ = std::fs::remove_file(&self.path); }
}

fn pattern(len: usize) -> Vec<u8> { (0..len).map(|i| (i % 251) as u8).collect() }

#[rstest]
#[tokio::test]
async fn whole_file_arrives_in_corked_chunks() {
    let contents = pattern(3 * TRANSFER_CHUNK + 100);
    let file = TempFile::with_contents("whole", &contents).await;
    let region = file.region(0, contents.len() as u64).await;
    let transport = RecordingTransport::default();

    region.transfer_to(&transport).await.expect("transfer");

    assert_eq!(transport.written(), contents);
    let flags: Vec<_> = transport.writes().into_iter().map(|(_, flags)| flags).collect();
    assert_eq!(
        flags,
        [WriteFlags::CORK, WriteFlags::CORK, WriteFlags::CORK, WriteFlags::NONE]
    );
    assert!(transport.buffers().iter().all(|buf| buf.len() <= TRANSFER_CHUNK));
}

#[rstest]
#[tokio::test]
async fn only_the_region_is_sent() {
    let contents = pattern(1000);
    let file = TempFile::with_contents("slice", &contents).await;
    let region = file.region(10, 100).await;
    let transport = RecordingTransport::default();

    region.transfer_to(&transport).await.expect("transfer");

    assert_eq!(transport.written(), &contents[10..110]);
    assert_eq!(transport.writes().len(), 1);
    assert_eq!(transport.writes()[0].1, WriteFlags::NONE);
}

#[rstest]
#[tokio::test]
async fn empty_region_writes_nothing() {
    let file = TempFile::with_contents("empty", b"data").await;
    let region = file.region(2, 0).await;
    let transport = RecordingTransport::default();

    region.transfer_to(&transport).await.expect("transfer");

    assert!(transport.writes().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_transfers_each_send_the_whole_region() {
    const SENDS: usize = 20;
    let contents = pattern(TRANSFER_CHUNK + 4000);
    let file = TempFile::with_contents("repeated", &contents).await;
    let region = file.region(0, contents.len() as u64).await;
    let transport = Arc::new(RecordingTransport::default());

    try_join_all((0..SENDS).map(|_| region.transfer_to(transport.as_ref() as &dyn Transport)))
        .await
        .expect("transfers");

    let written = transport.written();
    assert_eq!(written.len(), SENDS * contents.len());
    assert!(written.chunks(contents.len()).all(|copy| copy == contents.as_slice()));
}

#[rstest]
#[tokio::test]
async fn region_past_the_end_of_the_file_fails() {
    let contents = pattern(50);
    let file = TempFile::with_contents("short", &contents).await;
    let region = file.region(20, 100).await;
    let transport = RecordingTransport::default();

    let err = region.transfer_to(&transport).await.expect_err("file too short");

    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    assert_eq!(transport.written(), &contents[20..]);
}

#[rstest]
#[tokio::test]
async fn transport_errors_abort_the_transfer() {
    let file = TempFile::with_contents("broken", &pattern(10)).await;
    let region = file.region(0, 10).await;
    let transport = RecordingTransport::default();
    transport.fail_writes(true);

    let err = region.transfer_to(&transport).await.expect_err("transport failed");

    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
}
