//! Command-line front end for the model core.
//!
//! # Responsibility
//! - Print the core version when run without arguments.
//! - Print every stored object of one kind as a list or revision tree,
//!   following the default policy's presentation.
//!
//! Usage: `ecomodel_cli [--log-dir DIR] [DB_PATH KIND]`

use ecomodel_core::{
    core_version, default_log_level, init_logging, open_db, ModelGraph, ModelService, ModelStore,
    ObjectKind, SqliteModelStore, TemplatePool, TreeNode,
};
use log::info;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().skip(1).collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(mut args: Vec<String>) -> Result<(), Box<dyn Error>> {
    if let Some(position) = args.iter().position(|arg| arg == "--log-dir") {
        if position + 1 >= args.len() {
            return Err("--log-dir needs a directory".into());
        }
        let log_dir = args.remove(position + 1);
        args.remove(position);
        init_logging(default_log_level(), &log_dir)?;
    }

    let (db_path, kind) = match args.as_slice() {
        [] => {
            println!("ecomodel_core version={}", core_version());
            return Ok(());
        }
        [db_path, kind] => (db_path.as_str(), kind.as_str()),
        _ => return Err("usage: ecomodel_cli [--log-dir DIR] [DB_PATH KIND]".into()),
    };
    let kind = ObjectKind::parse(kind).ok_or_else(|| format!("unknown kind `{kind}`"))?;

    let conn = open_db(db_path)?;
    let service = ModelService::new(SqliteModelStore::try_new(&conn)?);
    let mut graph = ModelGraph::new();
    let mut pool = TemplatePool::with_ordering(service.policy().ordering);
    service.load_templates(&mut graph, &mut pool)?;

    let mut handles = Vec::new();
    for summary in service.store().list_other(kind, 0)? {
        handles.push(service.load_tree(&mut graph, &pool, kind, summary.id)?);
    }
    info!(
        "event=cli_tree module=cli status=ok kind={} objects={}",
        kind.as_str(),
        handles.len()
    );

    let tree = service.present(&graph, &handles);
    for child in &tree.root.children {
        print_node(&graph, child, 0);
    }
    Ok(())
}

fn print_node(graph: &ModelGraph, node: &TreeNode, depth: usize) {
    if let Some(object) = node.handle.and_then(|handle| graph.get(handle)) {
        let marker = if object.is_template() { " [template]" } else { "" };
        println!("{}{}{}", "  ".repeat(depth), object.display_name(), marker);
    }
    for child in &node.children {
        print_node(graph, child, depth + 1);
    }
}
