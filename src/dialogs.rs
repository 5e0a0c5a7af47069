//! User prompts: native dialogs via `rfd`, or preset answers.
//!
//! Button results are turned into [`InitialChoice`] / [`SaveChoice`] here and
//! nowhere else.
use std::collections::VecDeque;
use std::path::PathBuf;

use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialChoice {
    Preprocess,
    ViewRaw,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveChoice {
    Save,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFilter {
    pub name:       &'static str,
    pub extensions: &'static [&'static str],
}

pub const FIF_FILES: FileFilter = FileFilter { name: "FIF file", extensions: &["fif"] };
pub const DAT_FILES: FileFilter = FileFilter { name: "DAT file", extensions: &["dat"] };

pub trait Dialogs {
    fn initial_choice(&mut self) -> InitialChoice;

    /// Informational message with a single OK button.
    fn message(&mut self, title: &str, text: &str);

    fn error(&mut self, title: &str, text: &str);

    /// `None` when the user cancelled.
    fn pick_file(&mut self, title: &str, filter: FileFilter) -> Option<PathBuf>;

    fn pick_directory(&mut self, title: &str) -> Option<PathBuf>;

    /// Ask whether to save; `required` is the free space needed, formatted.
    fn save_choice(&mut self, required: &str) -> SaveChoice;
}

const PREPROCESS: &str = "Preprocess";
const VIEW_RAW: &str = "View raw";
const CANCEL: &str = "Cancel";

/// Native dialogs.
#[derive(Debug, Default)]
pub struct RfdDialogs;

impl Dialogs for RfdDialogs {
    fn initial_choice(&mut self) -> InitialChoice {
        let answer = MessageDialog::new()
            .set_level(MessageLevel::Info)
            .set_title("MEG explorer")
            .set_description(
                "Preprocess a recording (bad channels, head position, Maxwell and band-pass \
                 filtering) before viewing it, or view the raw recording?",
            )
            .set_buttons(MessageButtons::YesNoCancelCustom(
                PREPROCESS.to_string(),
                VIEW_RAW.to_string(),
                CANCEL.to_string(),
            ))
            .show();
        match answer {
            MessageDialogResult::Yes => InitialChoice::Preprocess,
            MessageDialogResult::No => InitialChoice::ViewRaw,
            MessageDialogResult::Custom(label) if label == PREPROCESS => InitialChoice::Preprocess,
            MessageDialogResult::Custom(label) if label == VIEW_RAW => InitialChoice::ViewRaw,
            _ => InitialChoice::Cancel,
        }
    }

    fn message(&mut self, title: &str, text: &str) {
        MessageDialog::new()
            .set_level(MessageLevel::Info)
            .set_title(title)
            .set_description(text)
            .set_buttons(MessageButtons::Ok)
            .show();
    }

    fn error(&mut self, title: &str, text: &str) {
        MessageDialog::new()
            .set_level(MessageLevel::Error)
            .set_title(title)
            .set_description(text)
            .set_buttons(MessageButtons::Ok)
            .show();
    }

    fn pick_file(&mut self, title: &str, filter: FileFilter) -> Option<PathBuf> {
        FileDialog::new()
            .set_title(title)
            .add_filter(filter.name, filter.extensions)
            .pick_file()
    }

    fn pick_directory(&mut self, title: &str) -> Option<PathBuf> {
        FileDialog::new().set_title(title).pick_folder()
    }

    fn save_choice(&mut self, required: &str) -> SaveChoice {
        let answer = MessageDialog::new()
            .set_level(MessageLevel::Info)
            .set_title("Save")
            .set_description(format!(
                "Preprocessing finished. Save the result? Make sure at least {required} of disk space is free."
            ))
            .set_buttons(MessageButtons::YesNo)
            .show();
        match answer {
            MessageDialogResult::Yes => SaveChoice::Save,
            _ => SaveChoice::Discard,
        }
    }
}

/// Answers every prompt from values fixed up front, and keeps a transcript
/// of what was asked.  Used by the headless binary mode and by tests.
#[derive(Debug, Clone)]
pub struct PresetDialogs {
    initial:        InitialChoice,
    files:          VecDeque<Option<PathBuf>>,
    directory:      Option<PathBuf>,
    save:           SaveChoice,
    pub transcript: Vec<String>,
}

impl PresetDialogs {
    pub fn new(initial: InitialChoice) -> Self {
        Self {
            initial,
            files: VecDeque::new(),
            directory: None,
            save: SaveChoice::Discard,
            transcript: Vec::new(),
        }
    }

    /// Answers for successive file pickers, in order; `None` cancels one.
    pub fn with_files<I>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = Option<PathBuf>>,
    {
        self.files.extend(files);
        self
    }

    pub fn with_save(mut self, choice: SaveChoice, directory: Option<PathBuf>) -> Self {
        self.save = choice;
        self.directory = directory;
        self
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.transcript.iter().filter_map(|l| l.strip_prefix("error: "))
    }
}

impl Dialogs for PresetDialogs {
    fn initial_choice(&mut self) -> InitialChoice {
        self.transcript.push(format!("initial: {:?}", self.initial));
        self.initial
    }

    fn message(&mut self, title: &str, text: &str) {
        info!(%title, "{text}");
        self.transcript.push(format!("message: {title}"));
    }

    fn error(&mut self, title: &str, text: &str) {
        error!(%title, "{text}");
        self.transcript.push(format!("error: {title}: {text}"));
    }

    fn pick_file(&mut self, title: &str, _filter: FileFilter) -> Option<PathBuf> {
        self.transcript.push(format!("pick file: {title}"));
        self.files.pop_front().flatten()
    }

    fn pick_directory(&mut self, title: &str) -> Option<PathBuf> {
        self.transcript.push(format!("pick directory: {title}"));
        self.directory.clone()
    }

    fn save_choice(&mut self, required: &str) -> SaveChoice {
        self.transcript.push(format!("save? ({required})"));
        self.save
    }
}
