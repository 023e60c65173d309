//! Classification of jobs that publish, deploy or destroy something.
//!
//! A sensitive job never receives the `always()` guard, so it cannot be forced
//! to run after an upstream failure. Matching errs on the side of flagging.

use crate::core::workflow::markers::is_marker_step;
use crate::core::workflow::schema::{Job, Step};
use regex::RegexSet;

/// Words that mark a job as sensitive wherever they appear in its ID or name.
const NAME_VOCABULARY: &[&str] = &[
    "release",
    "deploy",
    "publish",
    "ship",
    "upload",
    "staging",
    "production",
    "prod",
    "promote",
    "rollout",
];

/// Action path tokens that mark a third-party action as publishing.
const ACTION_VOCABULARY: &[&str] = &["deploy", "publish", "release"];

/// Shell commands with irreversible or externally visible effects.
const COMMAND_PATTERNS: &[&str] = &[
    // package registries
    r"\bnpm\s+(publish|dist-tag)\b",
    r"\byarn\s+(npm\s+)?publish\b",
    r"\bpnpm\s+(-r\s+)?publish\b",
    r"\bbun\s+publish\b",
    r"\bcargo\s+(publish|yank|owner)\b",
    r"\btwine\s+upload\b",
    r"\b(poetry|flit|hatch|pdm|uv)\s+publish\b",
    r"\bgem\s+(push|yank)\b",
    r"\bmvn\b.*\bdeploy\b",
    r"\bgradlew?\b.*\bpublish",
    r"\b(dotnet\s+)?nuget\s+push\b",
    r"\bgoreleaser\b",
    r"\bchangeset\s+publish\b",
    r"\blerna\s+publish\b",
    r"\bsemantic-release\b",
    r"\brelease-it\b",
    // container registries
    r"\b(docker|podman|nerdctl)\s+(image\s+)?push\b",
    r"\bdocker\s+buildx\s+.*--push\b",
    r"\bdocker\s+manifest\s+push\b",
    r"\bcrane\s+(push|copy|cp)\b",
    r"\bskopeo\s+copy\b",
    r"\bko\s+(publish|build)\b",
    // infrastructure
    r"\b(terraform|tofu|terragrunt)\s+(apply|destroy|import)\b",
    r"\bpulumi\s+(up|destroy)\b",
    r"\bkubectl\s+(apply|delete|replace|rollout|scale|drain)\b",
    r"\bhelm\s+(install|upgrade|uninstall|delete|rollback)\b",
    r"\bcdk\s+(deploy|destroy)\b",
    r"\bsam\s+deploy\b",
    r"\baws\s+(s3\s+(sync|cp|rm|rb)|cloudformation\s+(deploy|delete-stack)|ecs\s+update-service|lambda\s+update-function)\b",
    r"\bgcloud\b.*\b(deploy|delete)\b",
    r"\baz\b.*\b(deploy|delete)\b",
    // migrations
    r"\bprisma\s+(migrate\s+deploy|db\s+push)\b",
    r"\b(rails|rake|bundle\s+exec\s+rake)\s+db:(migrate|drop|reset|schema:load)\b",
    r"\balembic\s+(upgrade|downgrade)\b",
    r"\bflyway\s+(migrate|clean)\b",
    r"\bliquibase\s+update\b",
    r"\b(knex|sequelize)\s+(db:)?migrate\b",
    r"\bmanage\.py\s+migrate\b",
    r"\bdiesel\s+migration\s+run\b",
    r"\bsqlx\s+migrate\s+run\b",
    r"\bgoose\b.*\bup\b",
    r"\bmigrate\b.*\bup\b",
    r"\bdrizzle-kit\s+(push|migrate)\b",
    // platform deploys
    r"\bvercel\b.*(\bdeploy\b|--prod)",
    r"\bnetlify\s+deploy\b",
    r"\bwrangler\s+(deploy|publish|pages\s+deploy)\b",
    r"\bfly(ctl)?\s+deploy\b",
    r"\bfirebase\s+deploy\b",
    r"\b(serverless|sls)\s+deploy\b",
    r"\bheroku\b",
    r"\brailway\s+up\b",
    r"\bsupabase\s+(db\s+push|functions\s+deploy)\b",
    r"\bgh\s+release\s+(create|upload|edit|delete)\b",
    r"\bgit\s+push\b",
];

/// Actions whose only purpose is to publish or deploy.
const ACTION_PATTERNS: &[&str] = &[
    r"^softprops/action-gh-release\b",
    r"^actions/(create-release|upload-release-asset|deploy-pages)\b",
    r"^ncipollo/release-action\b",
    r"^docker/build-push-action\b",
    r"^pypa/gh-action-pypi-publish\b",
    r"^js-devtools/npm-publish\b",
    r"^changesets/action\b",
    r"^goreleaser/goreleaser-action\b",
    r"^peaceiris/actions-gh-pages\b",
    r"^jamesives/github-pages-deploy-action\b",
    r"^aws-actions/amazon-ecs-deploy",
    r"^azure/(webapps|functions|container-apps|k8s)-deploy\b",
    r"^google-github-actions/(deploy-|release-please)",
    r"^amondnet/vercel-action\b",
    r"^cloudflare/(wrangler-action|pages-action)\b",
    r"^superfly/flyctl-actions\b",
    r"^akhileshns/heroku-deploy\b",
    r"^hashicorp/tfc-workflows-github/actions/apply-run\b",
];

/// Explicitly constructed classifier; build once and share.
pub struct SensitivityClassifier {
    commands: RegexSet,
    actions: RegexSet,
}

impl SensitivityClassifier {
    pub fn new() -> Self {
        let commands = RegexSet::new(COMMAND_PATTERNS.iter().map(|p| format!("(?i){p}")))
            .expect("valid command patterns");
        let actions = RegexSet::new(ACTION_PATTERNS.iter().map(|p| format!("(?i){p}")))
            .expect("valid action patterns");
        Self { commands, actions }
    }

    /// Whether the job ID, its name, or any step marks it as sensitive.
    pub fn is_sensitive(&self, job_id: &str, job: &Job) -> bool {
        if name_matches(job_id) || job.name.as_deref().is_some_and(name_matches) {
            return true;
        }
        job.steps
            .iter()
            .filter(|step| !is_marker_step(step))
            .any(|step| self.step_is_sensitive(step))
    }

    pub fn step_is_sensitive(&self, step: &Step) -> bool {
        if let Some(uses) = step.uses.as_deref() {
            let action = uses.trim();
            if self.actions.is_match(action) {
                return true;
            }
            let path = action.split('@').next().unwrap_or(action);
            if path
                .split('/')
                .skip(1)
                .any(|segment| matches_vocabulary(segment, ACTION_VOCABULARY))
            {
                return true;
            }
        }
        step.run
            .as_deref()
            .is_some_and(|run| self.commands.is_match(run))
    }
}

impl Default for SensitivityClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn name_matches(text: &str) -> bool {
    matches_vocabulary(text, NAME_VOCABULARY)
}

/// Case-insensitive substring match against a vocabulary, so `canaryDeploy`
/// and `preprod` are caught along with `deploy-prod`.
fn matches_vocabulary(text: &str, vocabulary: &[&str]) -> bool {
    let lowered = text.to_ascii_lowercase();
    vocabulary.iter().any(|word| lowered.contains(word))
}
