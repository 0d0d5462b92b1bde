//! Netmap subcommand: decode a net-map payload and list its peers.

use chrono::{DateTime, Utc};
use tabled::Tabled;

use meshdock_core::{NetworkMap, Peer};

use crate::cli::{GlobalOpts, NetmapArgs};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct PeerRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "OS")]
    os: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Tags")]
    tags: String,
}

fn last_seen(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn peer_row(peer: &Peer, map: &NetworkMap, color: bool) -> PeerRow {
    PeerRow {
        name: peer.short_name().to_owned(),
        address: peer.primary_address().unwrap_or("-").to_owned(),
        os: peer.os.clone(),
        status: if peer.expired {
            "expired".into()
        } else {
            output::status_cell(peer.online, color)
        },
        last_seen: last_seen(peer.last_seen),
        user: map
            .user(&peer.user)
            .map_or_else(|| peer.user.clone(), |u| u.login_name.clone()),
        tags: peer.tags.join(","),
    }
}

fn peer_detail(peer: &Peer) -> String {
    output::detail_lines(&[
        ("Name", peer.name.clone()),
        ("ID", peer.id.clone()),
        ("Addresses", peer.addresses.join(", ")),
        ("OS", format!("{} {}", peer.os, peer.os_version).trim().to_owned()),
        ("Online", peer.online.to_string()),
        ("Last seen", last_seen(peer.last_seen)),
        ("Routes", peer.routes.join(", ")),
        ("Tags", peer.tags.join(", ")),
        ("SSH", peer.tailscale_ssh_enabled.to_string()),
    ])
}

pub fn handle(args: &NetmapArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let raw = util::read_input(&args.file)?;
    let map = NetworkMap::from_json(&raw)?;
    tracing::debug!(
        domain = %map.domain,
        peers = map.peers.len(),
        "network map decoded"
    );

    if let Some(hostname) = &args.selfservice {
        let peer = map
            .selfservice_peer(hostname)
            .ok_or_else(|| CliError::NotFound {
                resource_type: "self-service peer".into(),
                identifier: hostname.clone(),
                list_command: "netmap --online <FILE>".into(),
            })?;
        let out = output::render_single(&global.output, peer, peer_detail, |p| {
            p.primary_address().unwrap_or_default().to_owned()
        })?;
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let color = output::should_color(&global.color);
    let peers: Vec<&Peer> = if args.online {
        map.online_peers().collect()
    } else {
        map.peers.iter().collect()
    };
    let out = output::render_list(
        &global.output,
        &peers,
        |p| peer_row(p, &map, color),
        |p| p.short_name().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
