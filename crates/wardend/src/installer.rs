//! Restoration of the daemon configuration to a known-good state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::files::FileAccess;

const INSTALLER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::installer");

/// Resets the daemon's configuration after a crash.
pub trait Installer: Send + Sync {
    /// Restores the known-good configuration; true when a reset happened.
    ///
    /// A reset requested while another is in progress is dropped.
    fn reset_configuration(&self) -> bool;

    /// True while a reset is being applied.
    fn is_installing(&self) -> bool;
}

impl<T> Installer for Arc<T>
where
    T: Installer + ?Sized,
{
    fn reset_configuration(&self) -> bool {
        (**self).reset_configuration()
    }

    fn is_installing(&self) -> bool {
        (**self).is_installing()
    }
}

/// [`Installer`] that copies a template over the live configuration.
pub struct TemplateInstaller {
    template: Option<Utf8PathBuf>,
    config: Utf8PathBuf,
    files: Arc<dyn FileAccess>,
    installing: AtomicBool,
}

impl TemplateInstaller {
    /// Installer restoring `config` from `template`, when one is configured.
    pub fn new(
        template: Option<Utf8PathBuf>,
        config: Utf8PathBuf,
        files: Arc<dyn FileAccess>,
    ) -> Self {
        Self {
            template,
            config,
            files,
            installing: AtomicBool::new(false),
        }
    }

    fn copy_template(&self, template: &Utf8PathBuf) -> bool {
        let copied = self
            .files
            .read_lines(template)
            .and_then(|lines| self.files.rewrite_lines(&self.config, &lines));
        match copied {
            Ok(()) => {
                info!(
                    target: INSTALLER_TARGET,
                    config = %self.config,
                    template = %template,
                    "restored daemon configuration"
                );
                true
            }
            Err(error) => {
                warn!(target: INSTALLER_TARGET, error = %error, "configuration reset failed");
                false
            }
        }
    }
}

impl Installer for TemplateInstaller {
    fn reset_configuration(&self) -> bool {
        let Some(template) = self.template.as_ref() else {
            warn!(
                target: INSTALLER_TARGET,
                config = %self.config,
                "no configuration template; skipping reset"
            );
            return false;
        };
        if self
            .installing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let restored = self.copy_template(template);
        self.installing.store(false, Ordering::SeqCst);
        restored
    }

    fn is_installing(&self) -> bool {
        self.installing.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TemplateInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateInstaller")
            .field("template", &self.template)
            .field("config", &self.config)
            .field("installing", &self.is_installing())
            .finish_non_exhaustive()
    }
}
