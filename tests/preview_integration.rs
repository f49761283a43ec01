//! End-to-end behavior of the previewer against the rope-backed buffer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, Rgba, RgbaImage};
use markless_preview::config::PreviewConfig;
use markless_preview::editor::{
    BlockBuffer, BlockId, EditorBuffer, ImageBinding, PLACEHOLDER, ResourceStore, block_ids,
    block_texts,
};
use markless_preview::image::clean_path;
use markless_preview::preview::{
    DownloadCoordinator, FileUrlFetcher, PreviewController, PreviewEvent, PreviewHandle,
    is_preview_block,
};
use tempfile::{TempDir, tempdir};

const DEBOUNCE: Duration = Duration::from_millis(10);

fn write_png(dir: &TempDir, name: &str) -> String {
    let path = dir.path().join(name);
    RgbaImage::from_pixel(3, 2, Rgba([40, 80, 120, 255]))
        .save(&path)
        .unwrap();
    clean_path(&path).to_string_lossy().into_owned()
}

fn controller_for(dir: &TempDir, downloads: DownloadCoordinator) -> PreviewController {
    PreviewController::new(
        PreviewConfig::new(dir.path()).with_debounce(DEBOUNCE),
        downloads,
    )
}

/// Feed buffer changes to the controller and fire the timer until nothing
/// is outstanding. The clock advances one debounce interval per round.
fn settle_buffer(controller: &mut PreviewController, buffer: &mut EditorBuffer) {
    let start = Instant::now();
    let mut now = start;
    loop {
        let changes = buffer.take_changes();
        controller.poll(buffer, changes, now);
        for change in buffer.take_changes() {
            controller.handle_content_change(change, now);
        }
        if !controller.is_busy() {
            return;
        }
        assert!(start.elapsed() < Duration::from_secs(10), "previewer never settled");
        std::thread::sleep(Duration::from_millis(5));
        now += DEBOUNCE;
    }
}

fn placeholder() -> String {
    PLACEHOLDER.to_string()
}

#[test]
fn test_typing_a_reference_gets_a_preview_and_edits_follow_it() {
    let dir = tempdir().unwrap();
    let first = write_png(&dir, "first.png");
    let other = write_png(&dir, "other.png");
    let mut buffer = EditorBuffer::from_text("# Notes\n");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());

    buffer.move_to(1, 0);
    buffer.insert_str("![shot](first.png)");
    assert!(buffer.is_dirty());
    settle_buffer(&mut controller, &mut buffer);

    assert_eq!(
        block_texts(&buffer),
        vec!["# Notes".to_string(), "![shot](first.png)".to_string(), placeholder()]
    );
    let preview = buffer.block_at(2).unwrap();
    assert_eq!(buffer.binding(preview).unwrap().locator, first);
    assert!(buffer.is_dirty(), "preview edits keep the modified flag");

    // Retarget the reference; the same preview block gets rebound.
    buffer.move_to(1, 8);
    for _ in 0.."first".len() {
        buffer.delete_forward();
    }
    buffer.insert_str("other");
    settle_buffer(&mut controller, &mut buffer);
    assert_eq!(buffer.block_at(2), Some(preview));
    assert_eq!(buffer.binding(preview).unwrap().locator, other);
    let image = controller.preview_image(&buffer, preview).unwrap();
    assert_eq!((image.width(), image.height()), (3, 2));

    // Drop the reference; the orphaned preview goes away.
    buffer.move_to(1, 0);
    buffer.move_end();
    while buffer.line_len(1) > 0 {
        buffer.delete_back();
    }
    buffer.insert_str("plain text");
    settle_buffer(&mut controller, &mut buffer);
    assert_eq!(
        block_texts(&buffer),
        vec!["# Notes".to_string(), "plain text".to_string()]
    );
}

#[test]
fn test_clean_buffer_stays_clean_through_previews() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    let mut buffer = EditorBuffer::from_text("![a](a.png)\n\n![a](a.png)");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());

    controller.enable(Instant::now());
    settle_buffer(&mut controller, &mut buffer);

    let previews = block_ids(&buffer)
        .into_iter()
        .filter(|id| is_preview_block(&buffer, *id))
        .count();
    assert_eq!(previews, 2);
    assert!(!buffer.is_dirty());
    assert_eq!(controller.cache().len(), 1, "one locator, one cache entry");
}

#[test]
fn test_global_switch_off_clears_on_next_timer() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    let mut buffer = EditorBuffer::from_text("![a](a.png)");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    controller.enable(Instant::now());
    settle_buffer(&mut controller, &mut buffer);
    assert_eq!(buffer.line_count(), 2);

    controller.set_preview_images(false);
    buffer.move_to(0, 0);
    buffer.insert_char(' ');
    settle_buffer(&mut controller, &mut buffer);

    assert!(!controller.is_preview_enabled());
    assert_eq!(block_texts(&buffer), vec![" ![a](a.png)".to_string()]);
}

#[test]
fn test_file_url_is_fetched_in_background_then_previewed() {
    let dir = tempdir().unwrap();
    let path = write_png(&dir, "remote.png");
    let url = url::Url::from_file_path(&path).unwrap().to_string();
    let mut buffer = EditorBuffer::from_text(&format!("see\n![r]({url})"));
    let mut controller =
        controller_for(&dir, DownloadCoordinator::new(Arc::new(FileUrlFetcher)));

    controller.enable(Instant::now());
    settle_buffer(&mut controller, &mut buffer);

    assert_eq!(buffer.line_count(), 3);
    let preview = buffer.block_at(2).unwrap();
    assert_eq!(buffer.binding(preview).unwrap().locator, url);
    assert!(controller.cache().contains(&url));
    assert!(controller.downloads().requested().is_empty());
    assert!(controller.preview_image(&buffer, preview).is_some());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Disable,
    Refresh,
}

/// Buffer wrapper that issues previewer requests from inside the first
/// insertion, the way an editor callback reacting to the edit would.
struct HookedBuffer {
    inner: EditorBuffer,
    observer: PreviewHandle,
    on_insert: Vec<Request>,
    removed_while_scanning: usize,
    removed_after_scan: usize,
}

impl HookedBuffer {
    fn new(text: &str, controller: &PreviewController, on_insert: Vec<Request>) -> Self {
        Self {
            inner: EditorBuffer::from_text(text),
            observer: controller.handle(),
            on_insert,
            removed_while_scanning: 0,
            removed_after_scan: 0,
        }
    }

    fn preview_count(&self) -> usize {
        block_ids(&self.inner)
            .into_iter()
            .filter(|id| is_preview_block(&self.inner, *id))
            .count()
    }
}

impl BlockBuffer for HookedBuffer {
    fn first_block(&self) -> Option<BlockId> {
        self.inner.first_block()
    }
    fn next_block(&self, block: BlockId) -> Option<BlockId> {
        self.inner.next_block(block)
    }
    fn previous_block(&self, block: BlockId) -> Option<BlockId> {
        self.inner.previous_block(block)
    }
    fn block_text(&self, block: BlockId) -> Option<String> {
        self.inner.block_text(block)
    }
    fn binding(&self, block: BlockId) -> Option<ImageBinding> {
        self.inner.binding(block)
    }
    fn set_binding(&mut self, block: BlockId, binding: ImageBinding) -> bool {
        self.inner.set_binding(block, binding)
    }
    fn insert_block_after(
        &mut self,
        after: BlockId,
        text: &str,
        binding: Option<ImageBinding>,
    ) -> Option<BlockId> {
        let inserted = self.inner.insert_block_after(after, text, binding);
        for request in std::mem::take(&mut self.on_insert) {
            let deferred = match request {
                Request::Disable => self.observer.disable(),
                Request::Refresh => self.observer.refresh(),
            };
            assert!(deferred, "{request:?} is deferred while scanning");
        }
        inserted
    }
    fn remove_block(&mut self, block: BlockId) -> bool {
        let removed = self.inner.remove_block(block);
        if removed {
            if self.observer.is_scanning() {
                self.removed_while_scanning += 1;
            } else {
                self.removed_after_scan += 1;
            }
        }
        removed
    }
    fn set_block_text(&mut self, block: BlockId, text: &str) -> bool {
        self.inner.set_block_text(block, text)
    }
    fn begin_edit(&mut self) {
        self.inner.begin_edit();
    }
    fn end_edit(&mut self) {
        self.inner.end_edit();
    }
    fn is_modified(&self) -> bool {
        self.inner.is_modified()
    }
    fn set_modified(&mut self, modified: bool) {
        self.inner.set_modified(modified);
    }
}

impl ResourceStore for HookedBuffer {
    fn add_resource(&mut self, name: &str, image: DynamicImage) {
        self.inner.add_resource(name, image);
    }
    fn resource(&self, name: &str) -> Option<&DynamicImage> {
        self.inner.resource(name)
    }
}

#[test]
fn test_disable_during_pass_clears_once_after_it() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    write_png(&dir, "b.png");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    let mut buffer = HookedBuffer::new(
        "![a](a.png)\ntext\n![b](b.png)",
        &controller,
        vec![Request::Disable],
    );

    let summary = controller.preview_images(&mut buffer, Instant::now()).unwrap();

    // The walk stopped after the first insertion.
    assert_eq!(summary.inserted, 1);
    assert_eq!(buffer.removed_while_scanning, 0);
    assert_eq!(buffer.removed_after_scan, 1);
    assert_eq!(
        block_texts(&buffer.inner),
        vec![
            "![a](a.png)".to_string(),
            "text".to_string(),
            "![b](b.png)".to_string()
        ]
    );
    assert!(!controller.is_preview_enabled());
    assert!(!controller.handle().is_scanning());

    let cleared = controller
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, PreviewEvent::StatusChanged(s) if s.removed == 1))
        .count();
    assert_eq!(cleared, 1);

    // Nothing runs while disabled, and the request flags were consumed.
    assert!(!controller.handle().disable());
    let again = controller.timer_timeout(&mut buffer, Instant::now());
    assert!(again.is_none());
    assert_eq!(buffer.removed_after_scan, 1);
}

#[test]
fn test_refresh_outside_a_pass_rebuilds_previews() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    let mut buffer = EditorBuffer::from_text("![a](a.png)");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    controller.enable(Instant::now());
    settle_buffer(&mut controller, &mut buffer);
    let before = buffer.block_at(1).unwrap();

    assert!(!controller.handle().refresh());
    controller.refresh(&mut buffer, Instant::now());
    assert!(controller.cache().is_empty());
    assert_eq!(buffer.line_count(), 1);

    settle_buffer(&mut controller, &mut buffer);
    let after = buffer.block_at(1).unwrap();
    assert_ne!(before, after, "preview block was recreated");
    assert!(controller.preview_image(&buffer, after).is_some());
}

#[test]
fn test_refresh_during_pass_rebuilds_after_it() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    write_png(&dir, "b.png");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    let mut buffer = HookedBuffer::new(
        "![a](a.png)\ntext\n![b](b.png)",
        &controller,
        vec![Request::Refresh],
    );

    let now = Instant::now();
    let summary = controller.preview_images(&mut buffer, now).unwrap();

    // Refresh does not stop the walk; both previews went in first.
    assert_eq!(summary.inserted, 2);
    assert_eq!(buffer.removed_while_scanning, 0);
    assert_eq!(buffer.removed_after_scan, 2);
    assert_eq!(buffer.preview_count(), 0);
    assert!(controller.cache().is_empty());
    assert!(controller.is_preview_enabled());
    assert!(controller.timer().is_pending());

    // The restarted timer rebuilds every preview.
    let rebuilt = controller
        .poll(&mut buffer, Vec::new(), now + DEBOUNCE)
        .unwrap();
    assert_eq!(rebuilt.inserted, 2);
    assert_eq!(buffer.preview_count(), 2);
    assert_eq!(controller.cache().len(), 2);
    assert_eq!(buffer.removed_after_scan, 2);
}

#[test]
fn test_disable_and_refresh_during_one_pass_both_apply() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    let mut buffer = HookedBuffer::new(
        "![a](a.png)",
        &controller,
        vec![Request::Refresh, Request::Disable],
    );

    let now = Instant::now();
    controller.preview_images(&mut buffer, now).unwrap();

    assert_eq!(buffer.removed_while_scanning, 0);
    assert_eq!(buffer.removed_after_scan, 1);
    assert_eq!(buffer.preview_count(), 0);
    assert!(!controller.is_preview_enabled());
    assert!(controller.cache().is_empty(), "refresh ran after the clear");

    // Disabled: the restarted timer fires without rebuilding anything.
    assert!(controller.poll(&mut buffer, Vec::new(), now + DEBOUNCE).is_none());
    assert_eq!(buffer.preview_count(), 0);
}

#[test]
fn test_typing_below_a_new_preview_stays_in_its_line() {
    let dir = tempdir().unwrap();
    write_png(&dir, "a.png");
    let mut buffer = EditorBuffer::from_text("![a](a.png)\nhello");
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    buffer.move_to(1, 5);

    controller.enable(Instant::now());
    settle_buffer(&mut controller, &mut buffer);
    buffer.insert_char('!');
    settle_buffer(&mut controller, &mut buffer);

    assert_eq!(
        block_texts(&buffer),
        vec!["![a](a.png)".to_string(), placeholder(), "hello!".to_string()]
    );
}

#[test]
fn test_typing_after_orphan_removal_stays_in_its_line() {
    let dir = tempdir().unwrap();
    let mut buffer = EditorBuffer::from_text(&format!("{PLACEHOLDER}\nabc\ndef"));
    let mut controller = controller_for(&dir, DownloadCoordinator::disabled());
    buffer.move_to(1, 3);

    controller.enable(Instant::now());
    settle_buffer(&mut controller, &mut buffer);
    buffer.insert_char('X');
    settle_buffer(&mut controller, &mut buffer);

    assert_eq!(block_texts(&buffer), vec!["abcX", "def"]);
}
