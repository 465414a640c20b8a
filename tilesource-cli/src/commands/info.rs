//! `info` command: resolve source metadata and print it.

use tilesource::tilejson::SourceDescriptor;
use tracing::info;

use super::common::SourceArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

pub async fn run(runner: &CliRunner, args: SourceArgs) -> Result<(), CliError> {
    runner.log_startup("info");
    let source = runner.create_source(args.options())?;
    let descriptor = runner.load_source(&source).await?;

    info!(url = %args.url, templates = descriptor.tiles.len(), "Metadata resolved");
    print!("{}", describe(&descriptor));
    Ok(())
}

fn describe(descriptor: &SourceDescriptor) -> String {
    let mut out = String::new();
    out.push_str("Source\n");
    out.push_str("======\n");
    for template in &descriptor.tiles {
        out.push_str(&format!("  Tiles:       {}\n", template));
    }
    out.push_str(&format!(
        "  Zoom:        {}-{}\n",
        descriptor.min_zoom, descriptor.max_zoom
    ));
    out.push_str(&format!("  Scheme:      {}\n", descriptor.scheme));
    out.push_str(&format!("  Tile size:   {}\n", descriptor.tile_size));
    out.push_str(&format!("  Encoding:    {}\n", descriptor.encoding));
    let [west, south, east, north] = descriptor.bounds.as_array();
    out.push_str(&format!(
        "  Bounds:      {}, {}, {}, {}\n",
        west, south, east, north
    ));
    if let Some(attribution) = &descriptor.attribution {
        out.push_str(&format!("  Attribution: {}\n", attribution));
    }
    if let Some(layers) = &descriptor.vector_layer_ids {
        out.push_str(&format!("  Layers:      {}\n", layers.join(", ")));
    }
    if let Some(promote_id) = &descriptor.promote_id {
        out.push_str(&format!("  Promote id:  {}\n", promote_id));
    }
    out
}
