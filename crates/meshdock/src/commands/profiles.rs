//! Profile subcommand handlers.

use tabled::Tabled;

use meshdock_core::storage::{clear_current_profile, load_profiles, set_current_profile};
use meshdock_core::{Profile, ProfileId, ProfileSet};

use crate::cli::{GlobalOpts, ProfilesArgs, ProfilesCommand};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    current: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Login")]
    login: String,
    #[tabled(rename = "Control URL")]
    control_url: String,
    #[tabled(rename = "Hostname")]
    hostname: String,
}

fn profile_row(p: &Profile, current: Option<&ProfileId>, color: bool) -> ProfileRow {
    ProfileRow {
        current: output::marker_cell(current == Some(&p.id), color),
        name: p.id.to_string(),
        login: p.login_name().unwrap_or("-").to_owned(),
        control_url: p.control_url().unwrap_or("-").to_owned(),
        hostname: if p.prefs.hostname.is_empty() {
            "-".into()
        } else {
            p.prefs.hostname.clone()
        },
    }
}

fn detail(p: &Profile, current: bool) -> String {
    let or_dash = |v: Option<&str>| v.unwrap_or("-").to_owned();
    output::detail_lines(&[
        ("Name", p.id.to_string()),
        ("Current", current.to_string()),
        ("Login", or_dash(p.login_name())),
        ("Node ID", or_dash(p.node_id())),
        ("Control URL", or_dash(p.control_url())),
        ("Hostname", or_dash(Some(p.prefs.hostname.as_str()).filter(|h| !h.is_empty()))),
        ("Route all", p.prefs.route_all.to_string()),
        ("Want running", p.prefs.want_running.to_string()),
        ("Logged out", p.prefs.logged_out.to_string()),
        ("SSH server", p.prefs.run_ssh.to_string()),
        ("Tags", p.prefs.advertise_tags.join(", ")),
    ])
}

/// Accept `profile-<id>` as stored or the bare `<id>`.
fn resolve<'a>(set: &'a ProfileSet, name: &str) -> Result<&'a Profile, CliError> {
    let exact = ProfileId::new(name);
    let prefixed = ProfileId::new(format!("profile-{name}"));
    set.get(&exact)
        .or_else(|| set.get(&prefixed))
        .ok_or_else(|| CliError::NotFound {
            resource_type: "profile".into(),
            identifier: name.into(),
            list_command: "profiles list".into(),
        })
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ProfilesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let store = util::open_state(global)?;
    let set = load_profiles(&store)?;
    let color = output::should_color(&global.color);

    match args.command {
        ProfilesCommand::List => {
            let profiles: Vec<&Profile> = set.profiles.values().collect();
            let out = output::render_list(
                &global.output,
                &profiles,
                |p| profile_row(p, set.current.as_ref(), color),
                |p| p.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Current => {
            let profile = set.current_profile().ok_or_else(|| CliError::NotFound {
                resource_type: "current profile".into(),
                identifier: store.path().display().to_string(),
                list_command: "profiles list".into(),
            })?;
            let out = output::render_single(
                &global.output,
                profile,
                |p| detail(p, true),
                |p| p.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Show { name } => {
            let profile = resolve(&set, &name)?;
            let is_current = set.current.as_ref() == Some(&profile.id);
            let out = output::render_single(
                &global.output,
                profile,
                |p| detail(p, is_current),
                |p| p.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Use { name } => {
            let id = resolve(&set, &name)?.id.clone();
            set_current_profile(&store, &id)?;
            tracing::info!(profile = %id, "current profile updated");
            output::print_output(&format!("Current profile: {id}"), global.quiet);
            Ok(())
        }

        ProfilesCommand::Clear => {
            let removed = clear_current_profile(&store)?;
            let msg = if removed {
                "Current profile cleared"
            } else {
                "No current profile was set"
            };
            output::print_output(msg, global.quiet);
            Ok(())
        }
    }
}
