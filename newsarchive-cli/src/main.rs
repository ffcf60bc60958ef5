//! Command-line front end for building, packaging, and querying offline
//! Usenet archives.

use anyhow::{bail, Context, Result};
use archive_core::connectivity::{ConnectivityBuilder, NO_PARENT};
use archive_core::hashindex::HashIndexBuilder;
use archive_core::lexicon::LexiconBuilder;
use archive_core::package::PackageWriter;
use archive_core::{Archive, ArchiveCodec, SearchFlags};
use clap::{Parser, Subcommand, ValueEnum};
use galaxy::{ArchiveCodecKind, ArchiveEntry, Galaxy, GalaxyBuilder};
use msgid_codec::MsgIdCodec;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "newsarchive",
    about = "Build, package, and search memory-mapped Usenet archives",
    version,
    author
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecArg {
    Lz4,
    Zstd,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the Message-ID dictionary and hash index from a newline-delimited list of Message-IDs
    BuildMsgid {
        /// Input file, one Message-ID per line
        input: PathBuf,
        /// Output directory for midmeta/middata/midhash/midhashdata/midhosts
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build the thread-connectivity graph from a CSV of `index,parent,epoch`
    BuildConnectivity {
        /// Input CSV, one message per line: `index,parent_index_or_-1,epoch`
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build the full-text lexicon from a directory of message files
    ///
    /// Each file is named `<index>.msg` and has the format `From: ...\nSubject: ...\n\n<body>`.
    BuildLexicon {
        /// Directory of `<index>.msg` files
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Bundle a directory of named archive files into a single package
    Package {
        /// Directory containing the named archive files (middata, connmeta, ...)
        input: PathBuf,
        /// Output package file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Stream a directory of raw messages, dropping duplicate Message-IDs
    /// and preserving first occurrence (the "kill duplicates" tool)
    Dedup {
        /// Directory of raw `<index>.msg` files
        input: PathBuf,
        /// Output directory for the deduplicated `<index>.msg` files
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run a search query against an archive
    Search {
        /// Archive directory or package file
        archive: PathBuf,
        query: String,
        #[arg(long, value_enum, default_value = "lz4")]
        codec: CodecArg,
        /// Boost postings where matched words land close together
        #[arg(long)]
        adjacent: bool,
        /// Fall back to near-miss dictionary words for unmatched terms
        #[arg(long)]
        fuzzy: bool,
        /// Term-union (OR) instead of requiring every word to match (AND)
        #[arg(long)]
        union: bool,
    },

    /// Build a galaxy catalog over a set of archives
    GalaxyBuild {
        /// `path:name:codec` triples, one per archive (codec is `lz4` or `zstd`)
        #[arg(long = "archive", required = true)]
        archives: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show each available archive's view of a galaxy message (thread-warp navigation)
    Warp {
        catalog: PathBuf,
        msg_id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    match cli.command {
        Commands::BuildMsgid { input, output } => build_msgid(&input, &output),
        Commands::BuildConnectivity { input, output } => build_connectivity(&input, &output),
        Commands::BuildLexicon { input, output } => build_lexicon(&input, &output),
        Commands::Package { input, output } => package(&input, &output),
        Commands::Dedup { input, output } => dedup(&input, &output),
        Commands::Search { archive, query, codec, adjacent, fuzzy, union } => {
            search(&archive, &query, codec, adjacent, fuzzy, union)
        }
        Commands::GalaxyBuild { archives, output } => galaxy_build(&archives, &output),
        Commands::Warp { catalog, msg_id } => warp(&catalog, &msg_id),
    }
}

fn to_archive_codec(codec: CodecArg) -> ArchiveCodec {
    match codec {
        CodecArg::Lz4 => ArchiveCodec::Lz4,
        CodecArg::Zstd => ArchiveCodec::Zstd,
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    Ok(text.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
}

fn build_msgid(input: &Path, output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let msg_ids = read_lines(input)?;
    tracing::info!("building Message-ID dictionary for {} ids", msg_ids.len());

    let hosts: Vec<String> = {
        let mut seen = std::collections::BTreeSet::new();
        for id in &msg_ids {
            if let Some(host) = id.rsplit('@').next() {
                seen.insert(host.to_string());
            }
        }
        seen.into_iter().collect()
    };
    let codec = MsgIdCodec::with_hosts(hosts);

    let mut meta = Vec::with_capacity(msg_ids.len() * 4);
    let mut data = Vec::new();
    let mut hash_builder = HashIndexBuilder::new();
    let mut packed_offsets = Vec::with_capacity(msg_ids.len());
    for (i, msg_id) in msg_ids.iter().enumerate() {
        let packed = codec.pack(msg_id)?;
        meta.extend_from_slice(&(data.len() as u32).to_le_bytes());
        packed_offsets.push(data.len() as u32);
        data.extend_from_slice(&packed);
        hash_builder.insert(packed, i as u32);
    }
    let (hash, hashdata) = hash_builder.build(|i| packed_offsets[i]);

    std::fs::write(output.join("midmeta"), &meta)?;
    std::fs::write(output.join("middata"), &data)?;
    std::fs::write(output.join("midhash"), &hash)?;
    std::fs::write(output.join("midhashdata"), &hashdata)?;
    let mut hosts_blob = Vec::new();
    for host in codec.hosts().hosts_slice() {
        hosts_blob.extend_from_slice(host.as_bytes());
        hosts_blob.push(0);
    }
    std::fs::write(output.join("midhosts"), &hosts_blob)?;

    tracing::info!("wrote {} Message-IDs to {:?}", msg_ids.len(), output);
    Ok(())
}

fn build_connectivity(input: &Path, output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let lines = read_lines(input)?;
    let n = lines.len();
    let mut epoch = vec![0u32; n];
    let mut parent = vec![NO_PARENT; n];
    for line in &lines {
        let mut parts = line.splitn(3, ',');
        let index: usize = parts.next().context("missing index")?.trim().parse()?;
        let p: i32 = parts.next().context("missing parent")?.trim().parse()?;
        let e: u32 = parts.next().context("missing epoch")?.trim().parse()?;
        epoch[index] = e;
        parent[index] = p;
    }

    // The CSV's own indices carry no ordering guarantee, but §4.10 requires
    // a depth-first, subtree-contiguous layout where every child's dense
    // index exceeds its parent's — remap onto one before handing off to
    // `ConnectivityBuilder`, which assumes that invariant already holds.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots: Vec<usize> = Vec::new();
    for (i, &p) in parent.iter().enumerate() {
        match p {
            NO_PARENT => roots.push(i),
            p => children[p as usize].push(i),
        }
    }
    for c in &mut children {
        c.sort_by_key(|&idx| epoch[idx]);
    }
    roots.sort_by_key(|&idx| epoch[idx]);

    let mut remap = vec![0u32; n];
    let mut next = 0u32;
    let mut stack: Vec<usize> = Vec::new();
    for &root in roots.iter().rev() {
        stack.push(root);
    }
    while let Some(i) = stack.pop() {
        remap[i] = next;
        next += 1;
        for &c in children[i].iter().rev() {
            stack.push(c);
        }
    }

    let mut builder = ConnectivityBuilder::new(n);
    for i in 0..n {
        let new_parent = match parent[i] {
            NO_PARENT => NO_PARENT,
            p => remap[p as usize] as i32,
        };
        builder.set(remap[i] as usize, epoch[i], new_parent);
    }

    let (connmeta, conndata, toplevel) = builder.build();
    std::fs::write(output.join("connmeta"), &connmeta)?;
    std::fs::write(output.join("conndata"), &conndata)?;
    std::fs::write(output.join("toplevel"), &toplevel)?;
    tracing::info!("wrote connectivity graph for {n} messages to {:?}", output);
    Ok(())
}

struct ParsedMessage {
    from: String,
    subject: String,
    body: String,
}

fn parse_message_file(path: &Path) -> Result<ParsedMessage> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
    let mut from = String::new();
    let mut subject = String::new();
    let mut lines = text.lines();
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("From: ") {
            from = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("Subject: ") {
            subject = rest.to_string();
        }
    }
    let body: String = lines.collect::<Vec<_>>().join("\n");
    Ok(ParsedMessage { from, subject, body })
}

fn collect_message_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files: Vec<(u32, PathBuf)> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let stem = e.path().file_stem()?.to_str()?.parse::<u32>().ok()?;
            Some((stem, e.path().to_path_buf()))
        })
        .collect();
    files.sort_by_key(|(i, _)| *i);
    Ok(files)
}

fn build_lexicon(input: &Path, output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let files = collect_message_files(input)?;
    let mut builder = LexiconBuilder::new();
    for (index, path) in &files {
        let msg = parse_message_file(path)?;
        builder.tokenize_message(*index, &msg.from, &msg.subject, &msg.body);
    }
    let bytes = builder.build();
    std::fs::write(output.join("lexmeta_str"), &bytes.lexmeta_str)?;
    std::fs::write(output.join("lexstr"), &bytes.lexstr)?;
    std::fs::write(output.join("lexhash"), &bytes.lexhash)?;
    std::fs::write(output.join("lexhashdata"), &bytes.lexhashdata)?;
    std::fs::write(output.join("lexmeta"), &bytes.lexmeta)?;
    std::fs::write(output.join("lexdata"), &bytes.lexdata)?;
    std::fs::write(output.join("lexhit"), &bytes.lexhit)?;
    tracing::info!("built lexicon over {} messages to {:?}", files.len(), output);
    Ok(())
}

const NAMED_FILES: &[&str] = &[
    "desc_short",
    "desc_long",
    "conndata",
    "connmeta",
    "lexdata",
    "lexhash",
    "lexhashdata",
    "lexhit",
    "lexmeta",
    "lexmeta_str",
    "lexstr",
    "middata",
    "midmeta",
    "midhash",
    "midhashdata",
    "midhosts",
    "strings",
    "strmeta",
    "toplevel",
    "zdata",
    "zmeta",
    "zdict",
];

fn package(input: &Path, output: &Path) -> Result<()> {
    let mut writer = PackageWriter::new();
    for name in NAMED_FILES {
        let path = input.join(name);
        if let Ok(bytes) = std::fs::read(&path) {
            writer.set(name, bytes);
        }
    }
    writer.write(output)?;
    tracing::info!("wrote package {:?}", output);
    Ok(())
}

/// Pulls the `Message-ID:` header value out of a raw message's text, the
/// way `kill-duplicates.cpp`'s tolerant header scan does (case sensitivity
/// aside — header names are normalized by the importer upstream of this
/// tool, so a literal prefix match is enough here).
fn extract_message_id(text: &str) -> Option<&str> {
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("Message-ID: ").or_else(|| line.strip_prefix("Message-ID:")) {
            return Some(rest.trim());
        }
    }
    None
}

/// Streams a directory of raw `<index>.msg` files into `output`, dropping
/// any message whose Message-ID was already emitted and preserving first
/// occurrence — the "kill duplicates" tool (§2.1). Messages with no
/// parseable Message-ID pass through unconditionally, matching the
/// original's treatment of malformed headers as non-deduplicable.
fn dedup(input: &Path, output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    let files = collect_message_files(input)?;
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut duplicates = 0u32;
    let mut kept = 0u32;
    for (index, path) in &files {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
        let is_duplicate = match extract_message_id(&text) {
            Some(id) => !seen.insert(id.to_string()),
            None => false,
        };
        if is_duplicate {
            duplicates += 1;
            continue;
        }
        kept += 1;
        std::fs::write(output.join(format!("{index}.msg")), &text)?;
    }
    tracing::info!(
        "wrote {kept} unique messages to {:?} ({duplicates} duplicate(s) dropped out of {})",
        output,
        files.len()
    );
    Ok(())
}

fn search(archive_path: &Path, query: &str, codec: CodecArg, adjacent: bool, fuzzy: bool, union: bool) -> Result<()> {
    let archive = open_archive(archive_path, to_archive_codec(codec))?;
    let flags = SearchFlags { adjacent_words: adjacent, fuzzy_search: fuzzy, set_logic: !union };
    let results = archive.search(query, flags);

    let mut table = comfy_table::Table::new();
    table.set_header(vec!["rank", "from", "subject"]);
    for hit in &results.hits {
        use owo_colors::OwoColorize;
        table.add_row(vec![
            format!("{:.2}", hit.rank),
            archive.from(hit.msg_index).to_string(),
            archive.subject(hit.msg_index).bold().to_string(),
        ]);
    }
    println!("{table}");
    println!(
        "{} result(s){}",
        results.total,
        if results.truncated { " (truncated)" } else { "" }
    );
    Ok(())
}

fn open_archive(path: &Path, codec: ArchiveCodec) -> Result<Archive> {
    if path.is_dir() {
        Ok(Archive::open_dir(path, codec)?)
    } else {
        Ok(Archive::open_package(path, codec)?)
    }
}

fn galaxy_build(archive_specs: &[String], output: &Path) -> Result<()> {
    let mut parsed = Vec::new();
    for spec in archive_specs {
        let parts: Vec<&str> = spec.splitn(3, ':').collect();
        let [path, name, codec] = parts.as_slice() else {
            bail!("expected `path:name:codec`, got {spec:?}");
        };
        let codec = match *codec {
            "lz4" => ArchiveCodecKind::Lz4,
            "zstd" => ArchiveCodecKind::Zstd,
            other => bail!("unknown codec {other:?}"),
        };
        parsed.push((PathBuf::from(path), (*name).to_string(), codec));
    }

    let mut builder = GalaxyBuilder::new();
    let mut opened = Vec::new();
    for (path, name, codec) in &parsed {
        let runtime_codec = match codec {
            ArchiveCodecKind::Lz4 => ArchiveCodec::Lz4,
            ArchiveCodecKind::Zstd => ArchiveCodec::Zstd,
        };
        let archive = open_archive(path, runtime_codec)?;
        let entry = ArchiveEntry {
            path: path.to_string_lossy().to_string(),
            name: name.clone(),
            description: String::new(),
            codec: *codec,
        };
        builder.add_archive(entry.clone(), &archive);
        opened.push((entry, archive));
    }

    let refs: Vec<(&ArchiveEntry, &Archive)> = opened.iter().map(|(e, a)| (e, a)).collect();
    let catalog = builder.build(&refs);
    std::fs::write(output, serde_json::to_vec_pretty(&catalog)?)?;
    tracing::info!("wrote galaxy catalog with {} archives to {:?}", refs.len(), output);
    Ok(())
}

fn warp(catalog_path: &Path, msg_id: &str) -> Result<()> {
    let galaxy = Galaxy::open(catalog_path)?;
    let Some(global_index) = galaxy.find_by_msg_id(msg_id) else {
        bail!("Message-ID {msg_id:?} not known to this galaxy");
    };
    let entries = galaxy.warp(global_index)?;
    let mut table = comfy_table::Table::new();
    table.set_header(vec!["archive", "parent depth", "children"]);
    for entry in &entries {
        let name = galaxy.archive_entry(entry.archive)?.name.clone();
        table.add_row(vec![name, entry.parent_depth.to_string(), entry.direct_children.to_string()]);
    }
    println!("{table}");
    if !galaxy.parents_same(global_index)? {
        println!("note: containing archives disagree on this message's parent");
    }
    if !galaxy.children_same(global_index)? {
        println!("note: containing archives disagree on this message's children");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_core::connectivity::Connectivity;

    #[test]
    fn build_connectivity_lays_out_children_after_their_parent() {
        // CSV indices deliberately out of depth-first order: message 0's
        // parent (2) has a higher raw index than its child.
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "0,2,20\n1,-1,10\n2,-1,5\n").unwrap();
        let output = dir.path().join("out");

        build_connectivity(&input, &output).unwrap();

        let conn = Connectivity::open(
            &output.join("connmeta"),
            &output.join("conndata"),
            &output.join("toplevel"),
        )
        .unwrap();
        assert_eq!(conn.len(), 3);
        for i in 0..conn.len() as u32 {
            let p = conn.parent(i).unwrap();
            if p != archive_core::connectivity::NO_PARENT {
                assert!((p as u32) < i, "child {i} must be laid out after parent {p}");
            }
        }
        // message "2" in the CSV (epoch 5, root) has one child: message "0".
        let root = conn.toplevel().iter().find(|&&r| conn.total_subtree(r).unwrap() == 2).unwrap();
        assert_eq!(conn.children(*root).unwrap().len(), 1);
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_passes_through_unheadered_messages() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("0.msg"), "Message-ID: <a@x>\n\nfirst\n").unwrap();
        std::fs::write(input.join("1.msg"), "Message-ID: <a@x>\n\nduplicate\n").unwrap();
        std::fs::write(input.join("2.msg"), "Message-ID: <b@x>\n\nunique\n").unwrap();
        std::fs::write(input.join("3.msg"), "Subject: no id here\n\nno message id\n").unwrap();
        let output = dir.path().join("out");

        dedup(&input, &output).unwrap();

        let kept = collect_message_files(&output).unwrap();
        let kept_indices: Vec<u32> = kept.iter().map(|(i, _)| *i).collect();
        assert_eq!(kept_indices, vec![0, 2, 3]);
    }
}
