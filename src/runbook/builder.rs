use std::path::{Path, PathBuf};

use super::models::{Runbook, RunbookStep};
use crate::config::Config;
use crate::desktop::MouseButton;
use crate::error::Result;
use crate::steps::*;

impl Runbook {
    /// Build the executable steps, in order
    pub fn build_steps(&self, config: &Config) -> Result<Vec<Box<dyn Step>>> {
        self.steps.iter().map(|step| build_step(step, config)).collect()
    }
}

/// Turn one runbook entry into a step, running its construction checks
pub fn build_step(step: &RunbookStep, config: &Config) -> Result<Box<dyn Step>> {
    let built: Box<dyn Step> = match step {
        RunbookStep::OpenPage { url, wait_ms } => Box::new(OpenPage::new(url.clone()).with_wait(*wait_ms)),
        RunbookStep::GoToUrl { url, wait_ms } => Box::new(GoToUrl::new(url.as_str())?.with_wait(*wait_ms)),
        RunbookStep::SwitchPage { index } => Box::new(SwitchPage::new(*index)),
        RunbookStep::Wait { ms } => Box::new(Wait::new(*ms)),
        RunbookStep::ClickElement { xpath, css, wait_ms } => {
            Box::new(ClickElement::new(xpath.as_deref(), css.as_deref())?.with_wait(*wait_ms))
        }
        RunbookStep::FillInput {
            xpath,
            css,
            value,
            wait_ms,
        } => Box::new(FillInput::new(xpath.as_deref(), css.as_deref(), value.as_str())?.with_wait(*wait_ms)),
        RunbookStep::FillAndSubmit {
            xpath,
            css,
            value,
            wait_ms,
        } => Box::new(FillAndSubmit::new(xpath.as_deref(), css.as_deref(), value.as_str())?.with_wait(*wait_ms)),
        RunbookStep::SubmitForm { xpath, css, wait_ms } => {
            Box::new(SubmitForm::new(xpath.as_deref(), css.as_deref()).with_wait(*wait_ms))
        }
        RunbookStep::WaitForSelector { xpath, css, timeout_ms } => {
            let step = WaitForSelector::new(xpath.as_deref(), css.as_deref())?;
            Box::new(match timeout_ms {
                Some(ms) => step.with_timeout(*ms),
                None => step,
            })
        }
        RunbookStep::ExtractText { xpath, css, store_as } => {
            Box::new(ExtractText::new(xpath.as_deref(), css.as_deref(), store_as.clone())?)
        }
        RunbookStep::ClickAndDownload {
            xpath,
            css,
            directory,
            file_name,
            wait_ms,
        } => {
            let mut step = ClickAndDownload::new(xpath.as_deref(), css.as_deref())?.with_wait(*wait_ms);
            if let Some(directory) = directory {
                step = step.into_directory(directory.clone());
            }
            if let Some(file_name) = file_name {
                step = step.named(file_name.as_str());
            }
            Box::new(step)
        }
        RunbookStep::HandleDialog { policy, wait_ms } => Box::new(HandleDialog::new(*policy).with_wait(*wait_ms)),
        RunbookStep::StoreState { name } => Box::new(StoreState::new(name.as_str())?),
        RunbookStep::LoadState { name } => Box::new(LoadState::new(name.as_str())?),

        RunbookStep::MouseMove {
            x_ratio,
            y_ratio,
            duration_ms,
            wait_ms,
        } => {
            let step = MouseMove::new(*x_ratio, *y_ratio)?.with_wait(*wait_ms);
            Box::new(match duration_ms {
                Some(ms) => step.with_duration(*ms),
                None => step,
            })
        }
        RunbookStep::DragTo {
            x_ratio,
            y_ratio,
            duration_ms,
            wait_ms,
        } => {
            let step = DragTo::new(*x_ratio, *y_ratio)?.with_wait(*wait_ms);
            Box::new(match duration_ms {
                Some(ms) => step.with_duration(*ms),
                None => step,
            })
        }
        RunbookStep::Click {
            button,
            clicks,
            interval_ms,
            wait_ms,
        } => Box::new(Click::new(click_spec(*button, *clicks, *interval_ms)).with_wait(*wait_ms)),
        RunbookStep::ClickAt {
            x,
            y,
            button,
            clicks,
            interval_ms,
            wait_ms,
        } => Box::new(ClickAt::new(*x, *y, click_spec(*button, *clicks, *interval_ms))?.with_wait(*wait_ms)),
        RunbookStep::Keys { keys, wait_ms } => {
            let sequences = keys
                .iter()
                .map(|k| KeySequence::parse(k))
                .collect::<Result<Vec<_>>>()?;
            Box::new(Keys::new(sequences)?.with_wait(*wait_ms))
        }
        RunbookStep::TypeText { text, wait_ms } => Box::new(TypeText::new(text.as_str()).with_wait(*wait_ms)),
        RunbookStep::ClickOnReference {
            reference,
            threshold,
            button,
            clicks,
            interval_ms,
            duration_ms,
            wait_ms,
            on_miss,
        } => {
            let path = reference_path(reference, config);
            let mut step = ClickOnReference::with_threshold(path, threshold.unwrap_or(config.match_threshold))?
                .with_click(click_spec(*button, *clicks, *interval_ms))
                .with_wait(*wait_ms)
                .on_miss(*on_miss);
            if let Some(ms) = duration_ms {
                step = step.with_duration(*ms);
            }
            Box::new(step)
        }
        RunbookStep::Screenshot { delay_ms, wait_ms } => {
            let step = Screenshot::new().with_wait(*wait_ms);
            Box::new(match delay_ms {
                Some(ms) => step.with_delay(*ms),
                None => step,
            })
        }
        RunbookStep::Sleep { duration_ms, randomize } => Box::new(Sleep::new(*duration_ms, *randomize)),

        RunbookStep::CopyFile {
            source,
            destination,
            preserve_metadata,
        } => Box::new(CopyFile::new(source, destination).preserve_metadata(*preserve_metadata)),
        RunbookStep::MoveFile { source, destination } => Box::new(MoveFile::new(source, destination)),
        RunbookStep::DeleteFile { path, force } => Box::new(DeleteFile::new(path).force(*force)),
        RunbookStep::CopyLatestFile {
            extension,
            destination_dir,
            name_contains,
            new_name,
            search_paths,
        } => {
            let mut step = CopyLatestFile::new(extension, destination_dir)?;
            if let Some(fragment) = name_contains {
                step = step.name_contains(fragment.as_str());
            }
            if let Some(name) = new_name {
                step = step.renamed(name.as_str());
            }
            if let Some(paths) = search_paths {
                step = step.search_in(paths.clone());
            }
            Box::new(step)
        }
    };
    Ok(built)
}

fn click_spec(button: MouseButton, count: u32, interval_ms: Option<u64>) -> ClickSpec {
    let defaults = ClickSpec::default();
    ClickSpec {
        button,
        count,
        delay_ms: interval_ms.unwrap_or(defaults.delay_ms),
    }
}

/// Bare names live in the references directory; anything path-like is used as given
fn reference_path(reference: &str, config: &Config) -> PathBuf {
    let path = Path::new(reference);
    if path.components().count() > 1 || path.is_absolute() {
        path.to_path_buf()
    } else {
        config.reference_path(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runbook::parser::parse_yaml_with;
    use crate::runbook::resolver::EnvResolver;

    #[test]
    fn test_reference_path() {
        let config = Config::default();
        assert_eq!(
            reference_path("login_button", &config),
            config.references_dir.join("login_button.png")
        );
        assert_eq!(
            reference_path("assets/ok.png", &config),
            PathBuf::from("assets/ok.png")
        );
    }

    #[test]
    fn test_build_steps_in_order() {
        let yaml = r##"
runbook: "1.0"
steps:
  - type: open_page
  - type: fill_and_submit
    css: "#q"
    value: "invoices"
  - type: handle_dialog
    policy: dismiss
  - type: click_at
    x: 10
    y: 20
  - type: copy_latest_file
    extension: pdf
    destination_dir: out
"##;
        let resolver = EnvResolver::with_lookup(|_| None).unwrap();
        let runbook = parse_yaml_with(yaml, &resolver).unwrap();
        let steps = runbook.build_steps(&Config::default()).unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["OpenPage", "FillAndSubmit", "HandleDialog", "ClickAt", "CopyLatestFile"]
        );
    }

    #[test]
    fn test_build_rejects_bad_keys() {
        let step = RunbookStep::Keys {
            keys: vec!["ctrl+nosuchkey".to_string()],
            wait_ms: 0,
        };
        assert!(build_step(&step, &Config::default()).is_err());
    }
}
