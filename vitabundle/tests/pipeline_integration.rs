//! End-to-end pipeline runs against recording collaborators.
//!
//! The fakes stand in for the network and the external tools; archives are
//! real zip files extracted by `ZipExtractor`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use vitabundle::credentials::CredentialStore;
use vitabundle::manager::download::calculate_file_checksum;
use vitabundle::manager::{
    ArchiveExtractor, BundleId, ContainerSealer, DownloadTarget, Fetcher,
    ManagerError, ManagerResult, PackageDecryptor, PipelineConfig, ProgressCallback, ZipEntries,
    ZipExtractor,
};
use vitabundle::pipeline::{
    Collaborators, PipelineController, PipelineState, StatusEvent, StatusReporter, READY_MESSAGE,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
const DEMO_URL: &str = "http://cdn.test/BitterSmile.pkg";
const DEMO_BYTES: &[u8] = b"demo package payload";

type Log<T> = Arc<Mutex<Vec<T>>>;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeFetcher {
    downloads: Log<String>,
    lookups: Log<String>,
    body: String,
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path, progress: ProgressCallback<'_>) -> ManagerResult<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        fs::write(dest, DEMO_BYTES).unwrap();
        let len = DEMO_BYTES.len() as u64;
        progress(len / 2, len);
        progress(len, len);
        Ok(len)
    }

    fn fetch_text(&self, url: &str) -> ManagerResult<String> {
        self.lookups.lock().unwrap().push(url.to_string());
        Ok(self.body.clone())
    }
}

/// Lays out what `pkg2zip -x` would produce.
#[derive(Default)]
struct FakeDecryptor {
    calls: Log<PathBuf>,
}

impl PackageDecryptor for FakeDecryptor {
    fn decrypt(&self, package: &Path, dest_dir: &Path) -> ManagerResult<()> {
        self.calls.lock().unwrap().push(package.to_path_buf());
        let app = dest_dir.join("app").join("PCSG90096");
        fs::create_dir_all(app.join("sce_sys/package")).unwrap();
        fs::create_dir_all(app.join("resource/movie")).unwrap();
        fs::write(app.join("sce_sys/package/temp.bin"), b"license").unwrap();
        fs::write(app.join("eboot.bin"), b"elf").unwrap();
        Ok(())
    }
}

#[derive(Default)]
struct FakeSealer {
    calls: Log<(PathBuf, String, String)>,
    sealed_movies: Arc<AtomicBool>,
}

impl ContainerSealer for FakeSealer {
    fn seal(
        &self,
        work_dir: &Path,
        plaintext_dir: &str,
        output_path: &str,
        key: &str,
        label: &str,
    ) -> ManagerResult<()> {
        assert!(work_dir.join(plaintext_dir).is_dir());
        assert_eq!(key, KEY);
        assert_eq!(label, plaintext_dir);
        let movie = work_dir
            .join(plaintext_dir)
            .join("ux0_temp_game_PCSG90096_app_PCSG90096/resource/movie");
        if movie.exists() {
            self.sealed_movies.store(true, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push((
            work_dir.to_path_buf(),
            plaintext_dir.to_string(),
            output_path.to_string(),
        ));
        Ok(())
    }
}

/// Real zip extraction that records which archives were extracted.
#[derive(Default)]
struct RecordingExtractor {
    inner: ZipExtractor,
    extracted: Log<PathBuf>,
}

impl ArchiveExtractor for RecordingExtractor {
    type Entries = ZipEntries;

    fn list_entries(&self, archive: &Path) -> ManagerResult<ZipEntries> {
        self.inner.list_entries(archive)
    }

    fn extract_all(
        &self,
        archive: &Path,
        dest_dir: &Path,
        progress: ProgressCallback<'_>,
    ) -> ManagerResult<usize> {
        self.extracted.lock().unwrap().push(archive.to_path_buf());
        self.inner.extract_all(archive, dest_dir, progress)
    }

    fn read_entry(&self, archive: &Path, entry: &str) -> ManagerResult<Option<Vec<u8>>> {
        self.inner.read_entry(archive, entry)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Write a zip; entries ending in `/` are directories.
fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    write_zip_with(path, entries, SimpleFileOptions::default());
}

fn write_zip_with(path: &Path, entries: &[(&str, &[u8])], options: SimpleFileOptions) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// A `param.sfo` record holding a single `TITLE`.
fn title_sfo(title: &str) -> Vec<u8> {
    const HEADER_LEN: u32 = 20;
    const INDEX_LEN: u32 = 16;
    const UTF8: u16 = 0x0204;

    let keys = b"TITLE\0\0\0";
    let mut value = title.as_bytes().to_vec();
    value.push(0);
    let len = value.len() as u32;
    while value.len() % 4 != 0 {
        value.push(0);
    }

    let key_table = HEADER_LEN + INDEX_LEN;
    let data_table = key_table + keys.len() as u32;
    let mut out = Vec::new();
    out.extend_from_slice(b"\0PSF");
    out.extend_from_slice(&0x0101u32.to_le_bytes());
    out.extend_from_slice(&key_table.to_le_bytes());
    out.extend_from_slice(&data_table.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&UTF8.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(keys);
    out.extend_from_slice(&value);
    out
}

fn write_bundle(path: &Path, id: &str, title: &str) {
    let sfo = title_sfo(title);
    let id_dir = format!("{}/", id);
    let sfo_path = format!("{}/sce_sys/param.sfo", id);
    write_zip(
        path,
        &[
            ("app/", b""),
            ("app/eboot.bin", b"elf"),
            ("appmeta/", b""),
            ("appmeta/icon0.png", b"png"),
            (&id_dir, b""),
            (&sfo_path, &sfo),
        ],
    );
}

/// The primary bundle as shipped with the tool, rooted at `h-encore/`.
fn write_primary_bundle(path: &Path) {
    write_zip(
        path,
        &[
            ("h-encore/appmeta/ux0_temp_game_PCSG90096_app_PCSG90096/param.sfo", b"meta"),
            ("h-encore/savedata/ux0_temp_game_PCSG90096_app_PCSG90096/data.bin", b"save"),
        ],
    );
}

/// A prebuilt archive containing the whole primary tree.
fn write_full_archive(path: &Path) {
    write_zip(
        path,
        &[
            ("h-encore/app/ux0_temp_game_PCSG90096_app_PCSG90096/eboot.bin", b"elf"),
            (
                "h-encore/app/ux0_temp_game_PCSG90096_app_PCSG90096/sce_sys/package/temp.bin",
                b"license",
            ),
            (
                "h-encore/app/ux0_temp_game_PCSG90096_app_PCSG90096/resource/movie/op.mp4",
                b"movie",
            ),
            ("h-encore/appmeta/ux0_temp_game_PCSG90096_app_PCSG90096/param.sfo", b"meta"),
            ("h-encore/savedata/ux0_temp_game_PCSG90096_app_PCSG90096/data.bin", b"save"),
        ],
    );
}

fn sha256(path: &Path) -> String {
    calculate_file_checksum(path, &|_, _| {}).unwrap()
}

fn sha256_of(bytes: &[u8]) -> String {
    let scratch = TempDir::new().unwrap();
    let path = scratch.path().join("bytes");
    fs::write(&path, bytes).unwrap();
    sha256(&path)
}

struct Harness {
    temp: TempDir,
    fetcher: FakeFetcher,
    decryptor: FakeDecryptor,
    sealer: FakeSealer,
    extractor: RecordingExtractor,
    downloads: Log<String>,
    decrypts: Log<PathBuf>,
    seals: Log<(PathBuf, String, String)>,
    sealed_movies: Arc<AtomicBool>,
    extracted: Log<PathBuf>,
}

impl Harness {
    fn new() -> Self {
        let fetcher = FakeFetcher::default();
        let decryptor = FakeDecryptor::default();
        let sealer = FakeSealer::default();
        let extractor = RecordingExtractor::default();
        Self {
            temp: TempDir::new().unwrap(),
            downloads: Arc::clone(&fetcher.downloads),
            decrypts: Arc::clone(&decryptor.calls),
            seals: Arc::clone(&sealer.calls),
            sealed_movies: Arc::clone(&sealer.sealed_movies),
            extracted: Arc::clone(&extractor.extracted),
            fetcher,
            decryptor,
            sealer,
            extractor,
        }
    }

    fn base_dir(&self) -> PathBuf {
        self.temp.path().join("APP")
    }

    fn bundles_dir(&self) -> PathBuf {
        self.temp.path().join("bundles")
    }

    fn extra_dir(&self) -> PathBuf {
        self.temp.path().join("extra")
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.base_dir())
            .with_app_dir(self.bundles_dir())
            .with_demo_package(DownloadTarget::new(
                DEMO_URL,
                "BitterSmile.pkg",
                sha256_of(DEMO_BYTES),
            ))
            .with_removal_retry(2, Duration::from_millis(1))
    }

    /// Cache a valid prebuilt archive and point the config at its digest.
    fn cache_full_archive(&self, config: PipelineConfig) -> PipelineConfig {
        let path = self.base_dir().join("h-encore-full.zip");
        write_full_archive(&path);
        let digest = sha256(&path);
        config.with_full_archive(DownloadTarget::new("", "h-encore-full.zip", digest))
    }

    fn build(
        self,
        config: PipelineConfig,
    ) -> (
        PipelineController<FakeFetcher, RecordingExtractor, FakeDecryptor, FakeSealer>,
        tokio::sync::mpsc::UnboundedReceiver<StatusEvent>,
        Recorded,
    ) {
        let (status, rx) = StatusReporter::channel();
        let recorded = Recorded {
            temp: self.temp,
            downloads: self.downloads,
            decrypts: self.decrypts,
            seals: self.seals,
            sealed_movies: self.sealed_movies,
            extracted: self.extracted,
        };
        let mut controller = PipelineController::new(
            config,
            Collaborators {
                fetcher: self.fetcher,
                extractor: self.extractor,
                decryptor: self.decryptor,
                sealer: self.sealer,
            },
            CredentialStore::in_memory(),
            status,
        );
        controller.set_backup_key(KEY);
        (controller, rx, recorded)
    }
}

struct Recorded {
    temp: TempDir,
    downloads: Log<String>,
    decrypts: Log<PathBuf>,
    seals: Log<(PathBuf, String, String)>,
    sealed_movies: Arc<AtomicBool>,
    extracted: Log<PathBuf>,
}

impl Recorded {
    fn path(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    fn seal_outputs(&self) -> Vec<String> {
        self.seals
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, output)| output.clone())
            .collect()
    }
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn id(s: &str) -> BundleId {
    BundleId::parse(s).unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_prebuilt_archive_never_downloads() {
    let harness = Harness::new();
    let config = harness.cache_full_archive(harness.config());
    let (mut controller, mut rx, recorded) = harness.build(config);

    controller.run().await.unwrap();

    assert!(recorded.downloads.lock().unwrap().is_empty());
    assert!(recorded.decrypts.lock().unwrap().is_empty());
    assert_eq!(
        controller.history(),
        [
            PipelineState::Idle,
            PipelineState::CheckingCache,
            PipelineState::UnpackingPrimary,
            PipelineState::Sealing,
            PipelineState::Drained,
        ]
    );

    // Sealed in canonical order, in the primary tree, plaintext removed
    assert_eq!(
        recorded.seal_outputs(),
        [
            "PCSG90096/app",
            "PCSG90096/appmeta",
            "PCSG90096/license",
            "PCSG90096/savedata",
        ]
    );
    let root = recorded.path("APP/h-encore");
    for (work_dir, _, _) in recorded.seals.lock().unwrap().iter() {
        assert_eq!(work_dir, &root);
    }
    for subdir in ["app", "appmeta", "license", "savedata"] {
        assert!(!root.join(subdir).exists(), "{} left behind", subdir);
    }

    let events = drain(&mut rx);
    let n = events.len();
    assert_eq!(events[n - 2], StatusEvent::Percent(100));
    assert_eq!(events[n - 1], StatusEvent::Text(READY_MESSAGE.to_string()));
}

#[tokio::test]
async fn corrupted_prebuilt_archive_is_removed_and_demo_downloaded_once() {
    let harness = Harness::new();
    let full = harness.base_dir().join("h-encore-full.zip");
    fs::create_dir_all(harness.base_dir()).unwrap();
    fs::write(&full, b"truncated download").unwrap();
    write_primary_bundle(&harness.bundles_dir().join("h-encore.zip"));
    let config = harness.config();
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.run().await.unwrap();

    assert!(!full.exists());
    assert_eq!(*recorded.downloads.lock().unwrap(), [DEMO_URL]);
    assert_eq!(
        *recorded.decrypts.lock().unwrap(),
        [recorded.path("APP/BitterSmile.pkg")]
    );
    assert_eq!(
        controller.history(),
        [
            PipelineState::Idle,
            PipelineState::CheckingCache,
            PipelineState::Downloading,
            PipelineState::VerifyingDownload,
            PipelineState::UnpackingPrimary,
            PipelineState::UnpackingPrimary,
            PipelineState::Sealing,
            PipelineState::Drained,
        ]
    );

    // The license was copied from the decrypted app before sealing
    assert_eq!(
        recorded.seal_outputs(),
        [
            "PCSG90096/app",
            "PCSG90096/appmeta",
            "PCSG90096/license",
            "PCSG90096/savedata",
        ]
    );
}

#[tokio::test]
async fn cached_demo_package_is_reused() {
    let harness = Harness::new();
    fs::create_dir_all(harness.base_dir()).unwrap();
    fs::write(harness.base_dir().join("BitterSmile.pkg"), DEMO_BYTES).unwrap();
    write_primary_bundle(&harness.bundles_dir().join("h-encore.zip"));
    let config = harness.config().with_trim_app(false);
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.run().await.unwrap();

    assert!(recorded.downloads.lock().unwrap().is_empty());
    assert_eq!(recorded.decrypts.lock().unwrap().len(), 1);
    assert_eq!(controller.history()[2], PipelineState::UnpackingPrimary);
}

#[tokio::test]
async fn trimming_prunes_primary_resources_before_sealing() {
    let harness = Harness::new();
    let config = harness.cache_full_archive(harness.config());
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.run().await.unwrap();

    assert!(!recorded.sealed_movies.load(Ordering::SeqCst));
}

#[tokio::test]
async fn untrimmed_build_keeps_primary_resources() {
    let harness = Harness::new();
    let config = harness
        .cache_full_archive(harness.config())
        .with_trim_app(false);
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.run().await.unwrap();

    assert!(recorded.sealed_movies.load(Ordering::SeqCst));
}

#[tokio::test]
async fn queued_bundles_run_in_selection_order_with_primary_last() {
    let harness = Harness::new();
    let first = harness.bundles_dir().join("a.zip");
    let second = harness.bundles_dir().join("b.zip");
    write_bundle(&first, "PCSE00001", "First");
    write_bundle(&second, "PCSE00002", "Second");
    let config = harness.cache_full_archive(harness.config());
    let (mut controller, _rx, recorded) = harness.build(config);

    assert_eq!(controller.catalog().len(), 2);
    assert!(controller.select_bundle(&id("PCSE00002"), true));
    assert!(controller.select_bundle(&id("PCSE00001"), true));
    controller.run().await.unwrap();

    assert_eq!(
        *recorded.extracted.lock().unwrap(),
        [
            second.clone(),
            first.clone(),
            recorded.path("APP/h-encore-full.zip"),
        ]
    );
    assert_eq!(
        recorded.seal_outputs(),
        [
            "PCSE00002/app",
            "PCSE00002/appmeta",
            "PCSE00001/app",
            "PCSE00001/appmeta",
            "PCSG90096/app",
            "PCSG90096/appmeta",
            "PCSG90096/license",
            "PCSG90096/savedata",
        ]
    );

    let extra = recorded.path("extra");
    let seals = recorded.seals.lock().unwrap();
    assert_eq!(seals[0].0, extra);
    assert_eq!(seals[2].0, extra);
    assert_eq!(
        &controller.history()[..4],
        [
            PipelineState::Idle,
            PipelineState::CheckingCache,
            PipelineState::UnpackingQueued,
            PipelineState::Sealing,
        ]
    );
    assert_eq!(controller.state(), PipelineState::Drained);
}

#[tokio::test]
async fn extraction_failure_clears_the_queue() {
    let harness = Harness::new();
    let first = harness.bundles_dir().join("a.zip");
    let second = harness.bundles_dir().join("b.zip");
    write_bundle(&first, "PCSE00001", "First");
    write_bundle(&second, "PCSE00002", "Second");
    let config = harness.cache_full_archive(harness.config());
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.select_bundle(&id("PCSE00001"), true);
    controller.select_bundle(&id("PCSE00002"), true);
    // Broken after the catalog accepted it
    fs::write(&first, b"no longer a zip").unwrap();

    let result = controller.run().await;

    assert!(matches!(result, Err(ManagerError::ExtractionFailed { .. })));
    assert_eq!(controller.state(), PipelineState::Failed);
    assert!(controller.pending().is_empty());
    assert_eq!(*recorded.extracted.lock().unwrap(), [first]);
    assert!(recorded.seals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bundle_deleted_after_scan_fails_extraction() {
    let harness = Harness::new();
    let first = harness.bundles_dir().join("a.zip");
    let second = harness.bundles_dir().join("b.zip");
    write_bundle(&first, "PCSE00001", "First");
    write_bundle(&second, "PCSE00002", "Second");
    let config = harness.cache_full_archive(harness.config());
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.select_bundle(&id("PCSE00001"), true);
    controller.select_bundle(&id("PCSE00002"), true);
    fs::remove_file(&first).unwrap();

    let result = controller.run().await;

    match result {
        Err(ManagerError::ExtractionFailed { path, .. }) => assert_eq!(path, first),
        other => panic!("expected ExtractionFailed, got {:?}", other),
    }
    assert_eq!(controller.state(), PipelineState::Failed);
    assert!(controller.pending().is_empty());
    assert!(recorded.seals.lock().unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_entry_midway_fails_extraction() {
    const ICON: &[u8] = b"icon payload that gets one byte flipped";

    let harness = Harness::new();
    let bundle = harness.bundles_dir().join("a.zip");
    let sfo = title_sfo("First");
    write_zip_with(
        &bundle,
        &[
            ("app/", b""),
            ("app/eboot.bin", b"elf"),
            ("appmeta/", b""),
            ("appmeta/icon0.png", ICON),
            ("PCSE00001/", b""),
            ("PCSE00001/sce_sys/param.sfo", &sfo),
        ],
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
    );
    write_bundle(&harness.bundles_dir().join("b.zip"), "PCSE00002", "Second");
    let config = harness.cache_full_archive(harness.config());
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.select_bundle(&id("PCSE00001"), true);
    controller.select_bundle(&id("PCSE00002"), true);

    // Stored entries keep their payload verbatim; damage it behind the CRC
    let mut bytes = fs::read(&bundle).unwrap();
    let at = bytes
        .windows(ICON.len())
        .position(|w| w == ICON)
        .unwrap();
    bytes[at + 3] ^= 0xFF;
    fs::write(&bundle, &bytes).unwrap();

    let result = controller.run().await;

    assert!(matches!(result, Err(ManagerError::ExtractionFailed { .. })));
    assert_eq!(
        fs::read(recorded.path("extra/app/eboot.bin")).unwrap(),
        b"elf"
    );
    assert!(controller.pending().is_empty());
    assert_eq!(*recorded.extracted.lock().unwrap(), [bundle]);
    assert!(recorded.seals.lock().unwrap().is_empty());
    assert_eq!(controller.state(), PipelineState::Failed);
}

#[tokio::test]
async fn corrupted_demo_package_is_removed_and_downloaded_once() {
    let harness = Harness::new();
    let demo = harness.base_dir().join("BitterSmile.pkg");
    fs::create_dir_all(harness.base_dir()).unwrap();
    fs::write(&demo, b"half a package").unwrap();
    write_primary_bundle(&harness.bundles_dir().join("h-encore.zip"));
    let config = harness.config();
    let (mut controller, _rx, recorded) = harness.build(config);

    controller.run().await.unwrap();

    assert_eq!(*recorded.downloads.lock().unwrap(), [DEMO_URL]);
    assert_eq!(fs::read(&demo).unwrap(), DEMO_BYTES);
    assert_eq!(*recorded.decrypts.lock().unwrap(), [demo]);
    assert_eq!(
        &controller.history()[..4],
        [
            PipelineState::Idle,
            PipelineState::CheckingCache,
            PipelineState::Downloading,
            PipelineState::VerifyingDownload,
        ]
    );
    assert_eq!(controller.state(), PipelineState::Drained);
}

#[tokio::test]
async fn unremovable_cached_file_fails_after_retries() {
    let harness = Harness::new();
    // A directory where the cached archive should be cannot be removed as a file
    fs::create_dir_all(harness.base_dir().join("h-encore-full.zip")).unwrap();
    let config = harness.config();
    let (mut controller, mut rx, recorded) = harness.build(config);

    let result = controller.run().await;

    match result {
        Err(ManagerError::FileRemovalFailed { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected FileRemovalFailed, got {:?}", other),
    }
    assert_eq!(
        controller.history(),
        [
            PipelineState::Idle,
            PipelineState::CheckingCache,
            PipelineState::Failed,
        ]
    );
    assert!(recorded.downloads.lock().unwrap().is_empty());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, StatusEvent::Text(t) if t.contains("failed to remove"))));
}

#[tokio::test]
async fn fresh_download_mismatch_is_fatal() {
    let harness = Harness::new();
    let config = harness
        .config()
        .with_demo_package(DownloadTarget::new(DEMO_URL, "BitterSmile.pkg", "00".repeat(32)));
    let (mut controller, _rx, recorded) = harness.build(config);

    let result = controller.run().await;

    assert!(matches!(result, Err(ManagerError::DigestMismatch { .. })));
    assert_eq!(recorded.downloads.lock().unwrap().len(), 1);
    assert!(recorded.decrypts.lock().unwrap().is_empty());
    assert_eq!(controller.state(), PipelineState::Failed);
}

#[tokio::test]
async fn backup_key_is_fetched_once_then_read_from_store() {
    let temp = TempDir::new().unwrap();
    let store_path = temp.path().join("credentials.ini");
    let fetcher = FakeFetcher {
        body: format!("<html><b>Key</b>: {}</html>", KEY),
        ..Default::default()
    };
    let lookups = Arc::clone(&fetcher.lookups);

    let mut controller = PipelineController::new(
        PipelineConfig::new(temp.path().join("APP")),
        Collaborators {
            fetcher,
            extractor: ZipExtractor::new(),
            decryptor: FakeDecryptor::default(),
            sealer: FakeSealer::default(),
        },
        CredentialStore::load(&store_path).unwrap(),
        StatusReporter::disabled(),
    );

    let key = controller.resolve_backup_key("abcdef0123456789").await.unwrap();
    assert_eq!(key, KEY);
    assert_eq!(
        *lookups.lock().unwrap(),
        ["http://cma.henkaku.xyz/?aid=abcdef0123456789"]
    );

    let store = CredentialStore::load(&store_path).unwrap();
    assert_eq!(store.get("abcdef0123456789").as_deref(), Some(KEY));

    controller.resolve_backup_key("abcdef0123456789").await.unwrap();
    assert_eq!(lookups.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn backup_key_response_without_key_is_rejected() {
    let temp = TempDir::new().unwrap();
    let fetcher = FakeFetcher {
        body: "<html>Unknown account</html>".to_string(),
        ..Default::default()
    };

    let mut controller = PipelineController::new(
        PipelineConfig::new(temp.path().join("APP")),
        Collaborators {
            fetcher,
            extractor: ZipExtractor::new(),
            decryptor: FakeDecryptor::default(),
            sealer: FakeSealer::default(),
        },
        CredentialStore::in_memory(),
        StatusReporter::disabled(),
    );

    let result = controller.resolve_backup_key("abcdef0123456789").await;
    assert!(matches!(
        result,
        Err(ManagerError::CredentialFetchFailed { .. })
    ));
    assert!(matches!(
        controller.run().await,
        Err(ManagerError::MissingBackupKey)
    ));
}
