use async_trait::async_trait;
use bootstrap_kernel::settings::Mode;
use bootstrap_kernel::{BootstrapError, Change, Outcome, Settings, Step, StepCtx};

/// Provisions the application user with its role on the target database.
pub struct EnsureUserStep;

pub const NAME: &str = "ensure-user";

impl EnsureUserStep {
    async fn create(&self, ctx: &StepCtx<'_>) -> Result<Outcome, BootstrapError> {
        let user = &ctx.settings.user;
        let grant = ctx.settings.role_grant();

        ctx.catalog
            .create_user(
                ctx.database(),
                &user.username,
                user.password.expose(),
                std::slice::from_ref(&grant),
            )
            .await?;
        ctx.record(
            NAME,
            Change::UserCreated {
                database: ctx.database().to_string(),
                username: user.username.clone(),
            },
        );

        tracing::info!(
            database = ctx.database(),
            user = %user.username,
            role = %grant.role,
            "user created"
        );
        Ok(Outcome::Created)
    }
}

#[async_trait]
impl Step for EnsureUserStep {
    fn name(&self) -> &'static str {
        NAME
    }

    fn describe(&self, settings: &Settings) -> String {
        let verb = match settings.run.mode {
            Mode::Strict => "create",
            Mode::Ensure => "ensure",
        };
        format!(
            "{verb} user '{}' with role '{}' on database '{}'",
            settings.user.username, settings.user.role, settings.database.name
        )
    }

    async fn apply(&self, ctx: &StepCtx<'_>) -> Result<Outcome, BootstrapError> {
        if ctx.settings.run.mode == Mode::Strict {
            return self.create(ctx).await;
        }

        let username = &ctx.settings.user.username;
        let Some(existing) = ctx.catalog.find_user(ctx.database(), username).await? else {
            return self.create(ctx).await;
        };

        let grant = ctx.settings.role_grant();
        if existing.has_role(&grant) {
            tracing::info!(
                database = ctx.database(),
                user = %username,
                "user already present with required role"
            );
            return Ok(Outcome::AlreadyPresent);
        }

        let roles = vec![grant];
        ctx.catalog
            .grant_roles(ctx.database(), username, &roles)
            .await?;
        ctx.record(
            NAME,
            Change::RolesGranted {
                database: ctx.database().to_string(),
                username: username.clone(),
                roles,
            },
        );

        // The password of an existing user is never rotated here.
        tracing::info!(
            database = ctx.database(),
            user = %username,
            role = %ctx.settings.user.role,
            "granted missing role to existing user"
        );
        Ok(Outcome::Updated)
    }
}
