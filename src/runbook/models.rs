use serde::Deserialize;
use std::path::PathBuf;

use crate::desktop::MouseButton;
use crate::orchestrator::SessionOptions;
use crate::steps::{DialogPolicy, MissPolicy};

/// Root runbook document
#[derive(Debug, Clone, Deserialize)]
pub struct Runbook {
    /// Schema version (e.g., "1.0")
    pub runbook: String,

    #[serde(default)]
    pub metadata: RunbookMetadata,

    #[serde(default)]
    pub session: SessionOptions,

    pub steps: Vec<RunbookStep>,

    /// `${VAR}` placeholders that had no value when the runbook was loaded
    #[serde(skip)]
    pub unresolved: Vec<UnresolvedVar>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunbookMetadata {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedVar {
    pub name: String,
    /// Where the placeholder appeared, e.g. `steps[2].value`
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunbookStep {
    // === Browser ===
    OpenPage {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        wait_ms: u64,
    },
    GoToUrl {
        url: String,
        #[serde(default)]
        wait_ms: u64,
    },
    SwitchPage {
        index: i64,
    },
    Wait {
        ms: u64,
    },
    ClickElement {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        wait_ms: u64,
    },
    FillInput {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        value: String,
        #[serde(default)]
        wait_ms: u64,
    },
    FillAndSubmit {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        value: String,
        #[serde(default)]
        wait_ms: u64,
    },
    SubmitForm {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        wait_ms: u64,
    },
    WaitForSelector {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    ExtractText {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        store_as: Option<String>,
    },
    ClickAndDownload {
        #[serde(default)]
        xpath: Option<String>,
        #[serde(default)]
        css: Option<String>,
        #[serde(default)]
        directory: Option<PathBuf>,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        wait_ms: u64,
    },
    HandleDialog {
        #[serde(default)]
        policy: DialogPolicy,
        #[serde(default)]
        wait_ms: u64,
    },
    StoreState {
        name: String,
    },
    LoadState {
        name: String,
    },

    // === Desktop input ===
    MouseMove {
        x_ratio: f64,
        y_ratio: f64,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        wait_ms: u64,
    },
    DragTo {
        x_ratio: f64,
        y_ratio: f64,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        wait_ms: u64,
    },
    Click {
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_clicks")]
        clicks: u32,
        #[serde(default)]
        interval_ms: Option<u64>,
        #[serde(default)]
        wait_ms: u64,
    },
    ClickAt {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_clicks")]
        clicks: u32,
        #[serde(default)]
        interval_ms: Option<u64>,
        #[serde(default)]
        wait_ms: u64,
    },
    Keys {
        /// Each entry is a key (`enter`) or a chord (`ctrl+shift+t`)
        keys: Vec<String>,
        #[serde(default)]
        wait_ms: u64,
    },
    TypeText {
        text: String,
        #[serde(default)]
        wait_ms: u64,
    },
    ClickOnReference {
        /// A name under the references directory, or a path
        reference: String,
        #[serde(default)]
        threshold: Option<f32>,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_clicks")]
        clicks: u32,
        #[serde(default)]
        interval_ms: Option<u64>,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        wait_ms: u64,
        #[serde(default)]
        on_miss: MissPolicy,
    },
    Screenshot {
        #[serde(default)]
        delay_ms: Option<u64>,
        #[serde(default)]
        wait_ms: u64,
    },
    Sleep {
        duration_ms: u64,
        #[serde(default)]
        randomize: bool,
    },

    // === Files ===
    CopyFile {
        source: PathBuf,
        destination: PathBuf,
        #[serde(default = "default_true")]
        preserve_metadata: bool,
    },
    MoveFile {
        source: PathBuf,
        destination: PathBuf,
    },
    DeleteFile {
        path: PathBuf,
        #[serde(default)]
        force: bool,
    },
    CopyLatestFile {
        extension: String,
        destination_dir: PathBuf,
        #[serde(default)]
        name_contains: Option<String>,
        #[serde(default)]
        new_name: Option<String>,
        #[serde(default)]
        search_paths: Option<Vec<PathBuf>>,
    },
}

fn default_clicks() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl RunbookStep {
    /// The `type` tag as written in the runbook
    pub fn kind(&self) -> &'static str {
        match self {
            RunbookStep::OpenPage { .. } => "open_page",
            RunbookStep::GoToUrl { .. } => "go_to_url",
            RunbookStep::SwitchPage { .. } => "switch_page",
            RunbookStep::Wait { .. } => "wait",
            RunbookStep::ClickElement { .. } => "click_element",
            RunbookStep::FillInput { .. } => "fill_input",
            RunbookStep::FillAndSubmit { .. } => "fill_and_submit",
            RunbookStep::SubmitForm { .. } => "submit_form",
            RunbookStep::WaitForSelector { .. } => "wait_for_selector",
            RunbookStep::ExtractText { .. } => "extract_text",
            RunbookStep::ClickAndDownload { .. } => "click_and_download",
            RunbookStep::HandleDialog { .. } => "handle_dialog",
            RunbookStep::StoreState { .. } => "store_state",
            RunbookStep::LoadState { .. } => "load_state",
            RunbookStep::MouseMove { .. } => "mouse_move",
            RunbookStep::DragTo { .. } => "drag_to",
            RunbookStep::Click { .. } => "click",
            RunbookStep::ClickAt { .. } => "click_at",
            RunbookStep::Keys { .. } => "keys",
            RunbookStep::TypeText { .. } => "type_text",
            RunbookStep::ClickOnReference { .. } => "click_on_reference",
            RunbookStep::Screenshot { .. } => "screenshot",
            RunbookStep::Sleep { .. } => "sleep",
            RunbookStep::CopyFile { .. } => "copy_file",
            RunbookStep::MoveFile { .. } => "move_file",
            RunbookStep::DeleteFile { .. } => "delete_file",
            RunbookStep::CopyLatestFile { .. } => "copy_latest_file",
        }
    }

    /// Whether the step drives the browser
    pub fn needs_browser(&self) -> bool {
        matches!(
            self,
            RunbookStep::OpenPage { .. }
                | RunbookStep::GoToUrl { .. }
                | RunbookStep::SwitchPage { .. }
                | RunbookStep::ClickElement { .. }
                | RunbookStep::FillInput { .. }
                | RunbookStep::FillAndSubmit { .. }
                | RunbookStep::SubmitForm { .. }
                | RunbookStep::WaitForSelector { .. }
                | RunbookStep::ExtractText { .. }
                | RunbookStep::ClickAndDownload { .. }
                | RunbookStep::HandleDialog { .. }
                | RunbookStep::StoreState { .. }
                | RunbookStep::LoadState { .. }
        )
    }

    /// Whether the step injects input or captures the screen
    pub fn needs_desktop(&self) -> bool {
        matches!(
            self,
            RunbookStep::MouseMove { .. }
                | RunbookStep::DragTo { .. }
                | RunbookStep::Click { .. }
                | RunbookStep::ClickAt { .. }
                | RunbookStep::Keys { .. }
                | RunbookStep::TypeText { .. }
                | RunbookStep::ClickOnReference { .. }
                | RunbookStep::Screenshot { .. }
        )
    }
}

/// A problem that prevents the runbook from running
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}
