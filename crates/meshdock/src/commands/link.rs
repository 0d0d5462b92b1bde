//! Link subcommand handlers.

use meshdock_core::ConnectParams;

use crate::cli::{GlobalOpts, LinkArgs, LinkCommand};
use crate::error::CliError;
use crate::output;

fn detail(params: &ConnectParams) -> String {
    output::detail_lines(&[
        ("Protocol", params.proto.to_string()),
        ("Host", params.host.clone().unwrap_or_else(|| "-".into())),
        ("Port", params.effective_port().to_string()),
    ])
}

fn target(params: &ConnectParams) -> String {
    format!(
        "{}://{}:{}",
        params.proto,
        params.host.as_deref().unwrap_or_default(),
        params.effective_port()
    )
}

pub fn handle(args: LinkArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        LinkCommand::Encode { proto, host, port } => {
            let mut params = ConnectParams::new(proto);
            if let Some(host) = host {
                params = params.with_host(host);
            }
            if let Some(port) = port {
                params = params.with_port(port);
            }
            let token = params.encode()?;
            tracing::debug!(link = %target(&params), "link encoded");
            output::print_output(&token, global.quiet);
            Ok(())
        }

        LinkCommand::Decode { token } => {
            let params = ConnectParams::decode(&token)?;
            let out = output::render_single(&global.output, &params, detail, target)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
