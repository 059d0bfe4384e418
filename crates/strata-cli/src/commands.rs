use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_content::{
    ContentStore, DataRecord, Node, NodeUpdate, QueryPage, RecordQuery, SearchKind,
    SearchOptions, StoreConfig, WorkspaceStore,
};
use strata_query::{Group, RecordData, View};
use strata_repo::{strip_credentials, MergeStatus};
use strata_types::Author;
use tracing::debug;

use crate::cli::*;

/// One invocation: the opened store, the tenant it acts on, who writes, and
/// how to print.
struct Session {
    store: ContentStore,
    tenant: String,
    author: Author,
    format: OutputFormat,
}

impl Session {
    fn workspace(&self) -> anyhow::Result<Arc<WorkspaceStore>> {
        Ok(self.store.workspace(&self.tenant)?)
    }

    /// Print `value` as JSON, or hand it to `text` for the colored form.
    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(root) = cli.root {
        config = config.with_root(root);
    }
    let author = match cli.author {
        Some(author) => author.or(&config.default_author),
        None => config.default_author.clone(),
    };
    debug!(root = %config.root.display(), tenant = %cli.tenant, author = %author, "starting");
    let session = Session {
        store: ContentStore::new(config),
        tenant: cli.tenant,
        author,
        format: cli.format,
    };

    match cli.command {
        Command::Init => cmd_init(&session),
        Command::Node(args) => cmd_node(&session, args.action),
        Command::Record(args) => cmd_record(&session, args.action),
        Command::View(args) => cmd_view(&session, args.action),
        Command::Asset(args) => cmd_asset(&session, args.action),
        Command::Search(args) => cmd_search(&session, args),
        Command::Remote(args) => cmd_remote(&session, args.action),
        Command::Push(args) => cmd_push(&session, args),
        Command::Pull(args) => cmd_pull(&session, args),
        Command::Usage => cmd_usage(&session),
    }
}

fn cmd_init(s: &Session) -> anyhow::Result<()> {
    let repo = s.store.repository(&s.tenant)?;
    let branch = repo.current_branch()?;
    let out = serde_json::json!({
        "tenant": s.tenant,
        "root": repo.root(),
        "branch": branch,
    });
    s.emit(&out, |_| {
        println!(
            "{} Initialized tenant {} in {}",
            "✓".green().bold(),
            s.tenant.bold(),
            repo.root().display()
        );
        println!("  Branch: {}", branch.yellow());
    })
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

fn cmd_node(s: &Session, action: NodeAction) -> anyhow::Result<()> {
    let ws = s.workspace()?;
    match action {
        NodeAction::List => {
            let tree = ws.list_nodes()?;
            s.emit(&tree, |tree| {
                if tree.is_empty() {
                    println!("No nodes.");
                }
                print_tree(tree, 0);
            })
        }
        NodeAction::Create {
            title,
            kind,
            parent,
            content,
            properties,
        } => {
            let node = ws.create_node(&s.author, parent.unwrap_or_default(), &title, kind, &content, properties)?;
            s.emit(&node, |n| {
                println!("{} Created {} {} ({})", "✓".green().bold(), n.kind, n.title.bold(), n.id.to_string().cyan());
            })
        }
        NodeAction::Show { id } => {
            let node = ws.get_node(id)?;
            s.emit(&node, print_node)
        }
        NodeAction::Update {
            id,
            title,
            content,
            tags,
            icon,
            cover,
            properties,
        } => {
            let update = NodeUpdate {
                title,
                content,
                tags: tags.map(|t| split_tags(&t)),
                icon,
                cover,
                properties: (!properties.is_empty()).then_some(properties),
            };
            if update.is_empty() {
                bail!("nothing to update");
            }
            let node = ws.update_node(&s.author, id, update)?;
            s.emit(&node, |n| {
                println!("{} Updated {} ({})", "✓".green().bold(), n.title.bold(), n.id.to_string().cyan());
            })
        }
        NodeAction::Delete { id } => {
            let removed = ws.delete_node(&s.author, id)?;
            s.emit(&removed, |removed| {
                println!("{} Deleted {} node(s)", "✓".green().bold(), removed.len());
            })
        }
        NodeAction::History { id, limit } => {
            let history = ws.get_node_history(id, limit)?;
            s.emit(&history, |history| {
                if history.is_empty() {
                    println!("No history.");
                }
                for c in history {
                    println!(
                        "{}  {}  {}",
                        c.short_hash().yellow(),
                        c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                        c.message
                    );
                }
            })
        }
        NodeAction::Version { id, rev } => {
            let version = ws.get_node_version(id, &rev)?;
            s.emit(&version, |v| {
                println!("{} @ {}", v.title.bold(), v.rev.yellow());
                println!();
                println!("{}", v.content);
            })
        }
        NodeAction::Diff { id, rev } => {
            let diff = ws.diff_node(id, &rev)?;
            let unified = diff.to_unified(&format!("{id}@{rev}"), &id.to_string());
            let out = serde_json::json!({
                "additions": diff.additions(),
                "deletions": diff.deletions(),
                "diff": unified,
            });
            s.emit(&out, |_| {
                if diff.is_empty() {
                    println!("No changes since {}.", rev.yellow());
                }
                for line in unified.lines() {
                    match line.chars().next() {
                        Some('+') => println!("{}", line.green()),
                        Some('-') => println!("{}", line.red()),
                        Some('@') => println!("{}", line.cyan()),
                        _ => println!("{line}"),
                    }
                }
            })
        }
        NodeAction::Backlinks { id } => {
            let links = ws.backlinks(id)?;
            s.emit(&links, |links| {
                if links.is_empty() {
                    println!("No backlinks.");
                }
                for l in links {
                    println!("{} {}", l.title.bold(), l.node_id.to_string().dimmed());
                }
            })
        }
    }
}

fn print_tree(nodes: &[Node], depth: usize) {
    for node in nodes {
        let icon = if node.icon.is_empty() { "" } else { node.icon.as_str() };
        println!(
            "{}{}{} {} {}",
            "  ".repeat(depth),
            icon,
            if icon.is_empty() { "" } else { " " },
            node.title.bold(),
            format!("{} {}", node.kind, node.id).dimmed()
        );
        print_tree(&node.children, depth + 1);
    }
}

fn print_node(node: &Node) {
    println!("{} {}", node.title.bold(), format!("({})", node.kind).dimmed());
    println!("  Id: {}", node.id.to_string().cyan());
    if !node.parent_id.is_zero() {
        println!("  Parent: {}", node.parent_id.to_string().cyan());
    }
    if !node.tags.is_empty() {
        println!("  Tags: {}", node.tags.join(", "));
    }
    println!("  Modified: {}", node.modified.to_rfc3339());
    for p in &node.properties {
        let required = if p.required { "!" } else { "" };
        println!("  Property: {}:{}{}", p.name, p.kind, required);
    }
    for v in &node.views {
        let default = if v.default { " (default)" } else { "" };
        println!("  View: {} {}{}", v.name, v.id.to_string().dimmed(), default);
    }
    if !node.content.is_empty() {
        println!();
        println!("{}", node.content);
    }
}

fn split_tags(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Records and views
// ---------------------------------------------------------------------------

fn cmd_record(s: &Session, action: RecordAction) -> anyhow::Result<()> {
    let ws = s.workspace()?;
    match action {
        RecordAction::Add { node, data } => {
            let record = ws.append_record(&s.author, node, parse_data(&data)?)?;
            s.emit(&record, |r| {
                println!("{} Added record {}", "✓".green().bold(), r.id.to_string().cyan());
            })
        }
        RecordAction::List {
            node,
            view,
            filter,
            sort,
            offset,
            limit,
            grouped,
        } => {
            let query = RecordQuery {
                view,
                filters: parse_list(filter.as_deref())?,
                sorts: parse_list(sort.as_deref())?,
                offset,
                limit,
            };
            if grouped {
                let groups = ws.group_view_records(node, query)?;
                let out: Vec<_> = groups
                    .iter()
                    .map(|g| serde_json::json!({ "key": g.key, "records": g.records }))
                    .collect();
                return s.emit(&out, |_| {
                    for g in &groups {
                        let key = g.key.to_string();
                        let key = if key.is_empty() { "(empty)".to_string() } else { key };
                        println!("{} {}", key.bold(), format!("({})", g.records.len()).dimmed());
                        for r in &g.records {
                            print_record(r, 1);
                        }
                    }
                });
            }
            let page = if query.view.is_some() || !query.filters.is_empty() || !query.sorts.is_empty() {
                ws.query_records(node, query)?
            } else {
                ws.list_records(node, offset, limit)?
            };
            s.emit(&page, print_page)
        }
        RecordAction::Update { node, id, data } => {
            let record = ws.update_record(&s.author, node, id, parse_data(&data)?)?;
            s.emit(&record, |r| {
                println!("{} Updated record {}", "✓".green().bold(), r.id.to_string().cyan());
            })
        }
        RecordAction::Delete { node, id } => {
            let record = ws.delete_record(&s.author, node, id)?;
            s.emit(&record, |r| {
                println!("{} Deleted record {}", "✓".green().bold(), r.id.to_string().cyan());
            })
        }
    }
}

fn cmd_view(s: &Session, action: ViewAction) -> anyhow::Result<()> {
    let ws = s.workspace()?;
    match action {
        ViewAction::Create {
            node,
            name,
            filter,
            sort,
            group,
            default,
        } => {
            let mut view = View::new(name)
                .with_filters(parse_list(filter.as_deref())?)
                .with_sorts(parse_list(sort.as_deref())?)
                .with_groups(
                    group
                        .map(|property| {
                            vec![Group {
                                property,
                                hidden: Vec::new(),
                            }]
                        })
                        .unwrap_or_default(),
                );
            view.default = default;
            let view = ws.create_view(&s.author, node, view)?;
            s.emit(&view, |v| {
                println!("{} Created view {} ({})", "✓".green().bold(), v.name.bold(), v.id.to_string().cyan());
            })
        }
        ViewAction::Delete { node, view } => {
            ws.delete_view(&s.author, node, view)?;
            let out = serde_json::json!({ "deleted": view });
            s.emit(&out, |_| {
                println!("{} Deleted view {}", "✓".green().bold(), view.to_string().cyan());
            })
        }
    }
}

fn print_page(page: &QueryPage) {
    for r in &page.records {
        print_record(r, 0);
    }
    println!("{}", format!("{} of {} record(s)", page.records.len(), page.total).dimmed());
}

fn print_record(record: &DataRecord, depth: usize) {
    let fields: Vec<String> = record
        .data
        .iter()
        .map(|(k, v)| format!("{}={}", k.bold(), v))
        .collect();
    println!(
        "{}{}  {}",
        "  ".repeat(depth),
        record.id.to_string().dimmed(),
        fields.join("  ")
    );
}

fn parse_data(text: &str) -> anyhow::Result<RecordData> {
    serde_json::from_str(text).context("record data must be a JSON object")
}

/// A JSON value or array of values; absent means empty.
fn parse_list<T: DeserializeOwned>(text: Option<&str>) -> anyhow::Result<Vec<T>> {
    let Some(text) = text else {
        return Ok(Vec::new());
    };
    let value: serde_json::Value = serde_json::from_str(text).context("invalid JSON")?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(anyhow::Error::from))
        .collect()
}

// ---------------------------------------------------------------------------
// Assets and search
// ---------------------------------------------------------------------------

fn cmd_asset(s: &Session, action: AssetAction) -> anyhow::Result<()> {
    let ws = s.workspace()?;
    match action {
        AssetAction::Add { node, path, name } => {
            let name = match name {
                Some(name) => name,
                None => match path.file_name() {
                    Some(n) => n.to_string_lossy().into_owned(),
                    None => bail!("cannot derive an asset name from {}", path.display()),
                },
            };
            let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let asset = ws.save_asset(&s.author, node, &name, &bytes)?;
            s.emit(&asset, |a| {
                println!("{} Saved {} ({} bytes, {})", "✓".green().bold(), a.name.bold(), a.size, a.mime_type);
            })
        }
        AssetAction::List { node } => {
            let assets = ws.list_assets(node)?;
            s.emit(&assets, |assets| {
                if assets.is_empty() {
                    println!("No assets.");
                }
                for a in assets {
                    println!("{:<32} {:>10}  {}", a.name.bold(), a.size, a.mime_type.dimmed());
                }
            })
        }
        AssetAction::Delete { node, name } => {
            ws.delete_asset(&s.author, node, &name)?;
            let out = serde_json::json!({ "deleted": name });
            s.emit(&out, |_| {
                println!("{} Deleted {}", "✓".green().bold(), name.bold());
            })
        }
    }
}

fn cmd_search(s: &Session, args: SearchArgs) -> anyhow::Result<()> {
    let options = SearchOptions {
        query: args.query,
        limit: args.limit,
        match_title: args.title,
        match_body: args.body,
        match_fields: args.fields,
    };
    let results = s.workspace()?.search(&options)?;
    s.emit(&results, |results| {
        if results.is_empty() {
            println!("No matches.");
        }
        for r in results {
            let kind = match r.kind {
                SearchKind::Page => "page".blue(),
                SearchKind::Record => "record".magenta(),
            };
            println!("{:>3}  {} {} {}", r.score, kind, r.title.bold(), r.node_id.to_string().dimmed());
            if !r.snippet.is_empty() {
                println!("     {}", r.snippet);
            }
            for (field, value) in &r.matches {
                println!("     {field}: {value}");
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Remotes and sync
// ---------------------------------------------------------------------------

fn cmd_remote(s: &Session, action: RemoteAction) -> anyhow::Result<()> {
    let repo = s.store.repository(&s.tenant)?;
    match action {
        RemoteAction::Set {
            name,
            url,
            token,
            kind,
        } => {
            repo.set_remote(&name, &url)?;
            if let Some(token) = token {
                repo.set_remote_credentials(&name, &token, kind)?;
            }
            let shown = strip_credentials(&url);
            let out = serde_json::json!({ "name": name, "url": shown });
            s.emit(&out, |_| {
                if url.is_empty() {
                    println!("Removed remote {}", name.bold());
                } else {
                    println!("Remote {} → {}", name.bold(), shown.blue());
                }
            })
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn cmd_push(s: &Session, args: SyncArgs) -> anyhow::Result<()> {
    let repo = s.store.repository(&s.tenant)?;
    let branch = args.branch.unwrap_or_default();
    let result = runtime()?.block_on(repo.push(&args.remote, &branch))?;
    s.emit(&result, |r| {
        if r.up_to_date {
            println!("Pushing to {}... {}", args.remote.bold(), "up to date".green());
        } else {
            println!(
                "{} Pushed {} object(s) to {}",
                "✓".green().bold(),
                r.objects_sent,
                args.remote.bold()
            );
        }
    })
}

fn cmd_pull(s: &Session, args: SyncArgs) -> anyhow::Result<()> {
    let branch = args.branch.unwrap_or_default();
    let result = runtime()?.block_on(s.store.pull(&s.tenant, &args.remote, &branch))?;
    s.emit(&result, |r| match &r.status {
        MergeStatus::UpToDate => {
            println!("Pulling from {}... {}", args.remote.bold(), "up to date".green());
        }
        MergeStatus::FastForward => {
            println!("{} Fast-forwarded, {} file(s) changed", "✓".green().bold(), r.files.len());
        }
        MergeStatus::Conflict { files } => {
            println!("{} Histories diverged; local state kept", "✗".red().bold());
            for f in files {
                println!("  {} {}", "conflict:".red(), f);
            }
        }
    })?;
    if let MergeStatus::Conflict { files } = &result.status {
        bail!("pull found diverged histories in {} file(s)", files.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

fn cmd_usage(s: &Session) -> anyhow::Result<()> {
    let ws = s.workspace()?;
    let limits = s.store.config().quotas;
    let pages = count_nodes(&ws.list_nodes()?);
    let storage = ws.storage_usage()?;
    let out = serde_json::json!({
        "tenant": s.tenant,
        "pages": pages,
        "storage_bytes": storage,
        "limits": limits,
    });
    s.emit(&out, |_| {
        println!("Tenant {}", s.tenant.bold());
        println!("  Pages:   {} of {}", pages, ceiling(limits.max_pages));
        println!("  Storage: {} of {} bytes", storage, ceiling(limits.max_storage_bytes));
    })
}

fn count_nodes(nodes: &[Node]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}

fn ceiling(limit: u64) -> String {
    if limit == 0 {
        "unlimited".to_string()
    } else {
        limit.to_string()
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use strata_content::NodeType;
    use strata_types::Id;

    use super::*;

    fn run(root: &std::path::Path, args: &[&str]) -> anyhow::Result<()> {
        let root = root.to_string_lossy().into_owned();
        let argv = ["strata", "--root", root.as_str(), "--tenant", "acme", "--format", "json"];
        let cli = Cli::try_parse_from(argv.iter().chain(args.iter()).copied()).unwrap();
        run_command(cli)
    }

    fn store(root: &std::path::Path) -> ContentStore {
        ContentStore::new(StoreConfig::default().with_root(root))
    }

    #[test]
    fn parse_list_accepts_one_or_many() {
        let one: Vec<strata_query::Sort> = parse_list(Some(r#"{"property":"Age"}"#)).unwrap();
        assert_eq!(one.len(), 1);
        let many: Vec<strata_query::Sort> =
            parse_list(Some(r#"[{"property":"Age","direction":"desc"},{"property":"Name"}]"#))
                .unwrap();
        assert_eq!(many.len(), 2);
        assert!(parse_list::<strata_query::Sort>(None).unwrap().is_empty());
        assert!(parse_list::<strata_query::Sort>(Some(r#"{"property":"Age","direction":"up"}"#)).is_err());
        assert!(parse_list::<strata_query::Sort>(Some("not json")).is_err());
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(split_tags(" a, b ,,c"), ["a", "b", "c"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn init_and_create_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]).unwrap();
        assert!(dir.path().join("acme").is_dir());

        run(dir.path(), &["node", "create", "Welcome", "--content", "hello"]).unwrap();
        run(
            dir.path(),
            &["node", "create", "People", "--kind", "table", "--property", "Name:text"],
        )
        .unwrap();

        let ws = store(dir.path()).workspace("acme").unwrap();
        let nodes = ws.list_nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind, NodeType::Document);
        assert_eq!(ws.get_node(nodes[0].id).unwrap().content, "hello");
        assert_eq!(nodes[1].kind, NodeType::Table);
    }

    #[test]
    fn records_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let table = {
            let ws = store(dir.path()).workspace("acme").unwrap();
            ws.create_node(
                &Author::new("Tester", "tester@example.com"),
                Id::ZERO,
                "People",
                NodeType::Table,
                "",
                vec!["Name:text".parse().unwrap(), "Age:number".parse().unwrap()],
            )
            .unwrap()
            .id
            .to_string()
        };

        run(dir.path(), &["record", "add", &table, r#"{"Name":"Alice","Age":"25"}"#]).unwrap();
        run(dir.path(), &["record", "add", &table, r#"{"Name":"Bob","Age":10}"#]).unwrap();
        run(dir.path(), &["record", "list", &table, "--filter", r#"{"property":"Age","operator":"gt","value":18}"#])
            .unwrap();
        assert!(run(dir.path(), &["record", "add", &table, "[1, 2]"]).is_err());

        let ws = store(dir.path()).workspace("acme").unwrap();
        let page = ws.list_records(table.parse().unwrap(), 0, 0).unwrap();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn author_flag_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["node", "create", "Doc", "--author", "Ann <ann@example.com>"]).unwrap();
        run(dir.path(), &["node", "create", "Other", "--author", "Ann"]).unwrap();

        let ws = store(dir.path()).workspace("acme").unwrap();
        let nodes = ws.list_nodes().unwrap();
        let first = &ws.get_node_history(nodes[0].id, 0).unwrap()[0];
        assert_eq!((first.author.as_str(), first.author_email.as_str()), ("Ann", "ann@example.com"));
        let second = &ws.get_node_history(nodes[1].id, 0).unwrap()[0];
        assert_eq!(second.author, "Ann");
        assert_eq!(second.author_email, Author::default().email);
    }

    #[test]
    fn diff_and_backlinks_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let ws = store(dir.path()).workspace("acme").unwrap();
        let author = Author::default();
        let target = ws
            .create_node(&author, Id::ZERO, "Target", NodeType::Document, "v1", vec![])
            .unwrap();
        let link = format!("[t](../{}/index.md)", target.id);
        ws.create_node(&author, Id::ZERO, "Source", NodeType::Document, &link, vec![])
            .unwrap();
        let rev = ws.get_node_history(target.id, 0).unwrap()[0].hash.clone();
        drop(ws);

        let id = target.id.to_string();
        run(dir.path(), &["node", "update", &id, "--content", "v2"]).unwrap();
        run(dir.path(), &["node", "diff", &id, &rev]).unwrap();
        run(dir.path(), &["node", "backlinks", &id]).unwrap();
        assert!(run(dir.path(), &["node", "diff", &id, "no-such-rev"]).is_err());
    }

    #[test]
    fn update_needs_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let id = Id::new().to_string();
        let err = run(dir.path(), &["node", "update", &id]).unwrap_err();
        assert!(err.to_string().contains("nothing to update"));
    }

    #[test]
    fn push_then_pull_between_tenants() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["node", "create", "Shared", "--content", "from acme"]).unwrap();

        let origin = tempfile::tempdir().unwrap();
        strata_repo::Repository::init(origin.path(), "main").unwrap();
        let url = origin.path().to_string_lossy().into_owned();
        run(dir.path(), &["remote", "set", "origin", &url]).unwrap();
        run(dir.path(), &["push"]).unwrap();

        let other = tempfile::tempdir().unwrap();
        let argv = |cmd: &[&str]| {
            let root = other.path().to_string_lossy().into_owned();
            let mut args = vec!["strata".to_string(), "--root".into(), root];
            args.extend(cmd.iter().map(|s| s.to_string()));
            run_command(Cli::try_parse_from(args).unwrap())
        };
        argv(&["remote", "set", "origin", &url]).unwrap();
        argv(&["pull"]).unwrap();

        let ws = store(other.path()).workspace("default").unwrap();
        let nodes = ws.list_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(ws.get_node(nodes[0].id).unwrap().content, "from acme");
    }
}
