//! Interactive confirmation prompts on the controlling terminal.

use std::pin::Pin;

use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use tracing::warn;

use warden_core::gateway::{
    ConfirmationProvider, ConfirmationRequest, Decision, PermissionTarget,
};
use warden_tools::security::SensitivityTier;

pub struct CliConfirmationProvider;

const CHOICES: &[&str] = &[
    "allow once",
    "trust this target",
    "always allow this tool",
    "deny",
];

fn describe(request: &ConfirmationRequest<'_>) -> String {
    let target = match request.target {
        PermissionTarget::Path { raw, .. } => format!("path '{raw}'"),
        PermissionTarget::Command { command, .. } => format!("command `{command}`"),
        PermissionTarget::Tool => "no external target".to_string(),
    };
    let warning = match request.tier {
        Some(SensitivityTier::ExtremelySensitive) => " [EXTREMELY SENSITIVE]",
        Some(SensitivityTier::Sensitive) => " [sensitive]",
        _ => "",
    };
    format!("{} wants to run: {target}{warning}", request.tool_id)
}

impl ConfirmationProvider for CliConfirmationProvider {
    fn confirm<'a>(
        &'a self,
        request: ConfirmationRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Decision> + Send + 'a>> {
        let prompt = describe(&request);
        Box::pin(async move {
            let choice = tokio::task::spawn_blocking(move || {
                Select::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .items(CHOICES)
                    .default(0)
                    .interact()
            })
            .await;
            match choice {
                Ok(Ok(0)) => Decision::AllowOnce,
                Ok(Ok(1)) => Decision::TrustTarget,
                Ok(Ok(2)) => Decision::TrustGlobal,
                Ok(Ok(_)) => Decision::Deny,
                Ok(Err(err)) => {
                    // No usable terminal; fail closed.
                    warn!(error = %err, "confirmation prompt unavailable, denying");
                    Decision::Deny
                }
                Err(err) => {
                    warn!(error = %err, "confirmation task failed, denying");
                    Decision::Deny
                }
            }
        })
    }
}
