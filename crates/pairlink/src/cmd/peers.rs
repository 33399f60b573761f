use pairlink_transport::PeerDirectory;
use tracing::warn;

use crate::cmd::{open_directory, PeersArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_peers, OutputFormat, PeerRow};

pub fn run(args: PeersArgs, format: OutputFormat) -> CliResult<i32> {
    let exclude = args.exclude.as_deref().unwrap_or("");
    let directory = open_directory(&args.root, exclude)?;
    let rows = collect_rows(directory.as_ref(), args.identifier.as_ref())?;
    print_peers(&rows, format);
    Ok(SUCCESS)
}

fn collect_rows(
    directory: &dyn PeerDirectory,
    wanted: Option<&pairlink_transport::SharedIdentifier>,
) -> CliResult<Vec<PeerRow>> {
    let candidates = directory
        .list_candidates()
        .map_err(|err| transport_error("listing peers failed", &err))?;

    let mut rows = Vec::new();
    for peer in candidates {
        if let Err(err) = directory.refresh(&peer) {
            warn!(peer = %peer, error = %err, "skipping peer that failed to refresh");
            continue;
        }
        let advertised = directory
            .resolve(&peer)
            .map_err(|err| transport_error("resolving peer failed", &err))?;
        if wanted.is_some_and(|id| !advertised.contains(id)) {
            continue;
        }
        let mut identifiers: Vec<String> = advertised.iter().map(ToString::to_string).collect();
        identifiers.sort();
        rows.push(PeerRow {
            name: peer.name().to_string(),
            address: peer.address().to_string(),
            identifiers,
        });
    }
    Ok(rows)
}
