use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::{DefaultTerminal, Frame};

use tui_treegrid::{
    ColumnDef, FilterConfig, Node, NodeData, RowCache, TREE_COLUMN, TreeAction,
    TreeGrid, TreeGridOptions, TreeGridState, TreeGridStyle, TreeRegistry,
};

/// Reads one directory level; sub-directories stay lazy until expanded.
fn read_level(path: &Path) -> io::Result<Vec<NodeData>> {
    let mut entries: Vec<(bool, String, NodeData)> = fs::read_dir(path)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let metadata = fs::symlink_metadata(&path).ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            Some((metadata.is_dir(), name.clone(), entry_data(&path, name, &metadata)))
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(entries.into_iter().map(|(_, _, data)| data).collect())
}

fn entry_data(path: &Path, name: String, metadata: &fs::Metadata) -> NodeData {
    let is_dir = metadata.is_dir();
    let mut data = NodeData::new(name)
        .key(path.display().to_string())
        .node_type(if is_dir { "dir" } else { "file" })
        .cell("size", if is_dir { "-".to_string() } else { format_size(metadata.len()) })
        .cell("modified", format_modified(metadata));
    if is_dir {
        data = data.lazy();
    }
    data
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "K", "M", "G"];
    let mut size = bytes;
    let mut unit = 0;
    while size >= 1024 && unit + 1 < UNITS.len() {
        size /= 1024;
        unit += 1;
    }
    format!("{size}{}", UNITS[unit])
}

fn format_modified(metadata: &fs::Metadata) -> String {
    match metadata.modified() {
        Ok(time) => {
            let datetime: DateTime<Local> = DateTime::from(time);
            datetime.format("%Y-%m-%d %H:%M").to_string()
        }
        Err(_) => "-".to_string(),
    }
}

/// Serves pending lazy loads from the file system.
fn load_pending(state: &mut TreeGridState<RowCache>) {
    for id in state.take_load_requests() {
        let Some(path) = state.tree().get(id).map(|node| PathBuf::from(node.key())) else {
            continue;
        };
        let result = read_level(&path).map_err(|err| err.to_string()).and_then(|batch| {
            state
                .finish_load(id, &batch)
                .map(|_| ())
                .map_err(|err| err.to_string())
        });
        if let Err(message) = result {
            log::warn!("loading {} failed: {message}", path.display());
            if let Err(err) = state.fail_load(id, message) {
                log::warn!("{err}");
            }
        }
    }
}

fn render(frame: &mut Frame, state: &mut TreeGridState<RowCache>, style: &TreeGridStyle<'_>) {
    let widget = TreeGrid::new(style.clone());
    frame.render_stateful_widget(widget, frame.area(), state);
}

fn toggle_filter(state: &mut TreeGridState<RowCache>) {
    if state.tree().is_filtered() {
        state.clear_filter();
    } else {
        state.filter_nodes(&|node: &Node| node.title.ends_with(".rs"));
    }
}

fn handle_key(state: &mut TreeGridState<RowCache>, code: KeyCode) -> bool {
    let action = match code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Char('f') => {
            toggle_filter(state);
            return true;
        }
        KeyCode::Up | KeyCode::Char('k') => TreeAction::SelectPrev,
        KeyCode::Down | KeyCode::Char('j') => TreeAction::SelectNext,
        KeyCode::Left | KeyCode::Char('h') => TreeAction::SelectParent,
        KeyCode::Right | KeyCode::Char('l') => TreeAction::SelectChild,
        KeyCode::PageUp => TreeAction::PageUp,
        KeyCode::PageDown => TreeAction::PageDown,
        KeyCode::Home => TreeAction::SelectFirst,
        KeyCode::End => TreeAction::SelectLast,
        KeyCode::Enter => TreeAction::ToggleNode,
        KeyCode::Char(' ') => TreeAction::ToggleSelected,
        KeyCode::Char('E') => TreeAction::ExpandAll,
        KeyCode::Char('C') => TreeAction::CollapseAll,
        _ => return true,
    };
    if let Err(err) = state.handle_action::<()>(action) {
        log::warn!("{err}");
    }
    true
}

fn run_app(
    mut terminal: DefaultTerminal,
    mut state: TreeGridState<RowCache>,
    style: TreeGridStyle<'_>,
) -> io::Result<()> {
    loop {
        load_pending(&mut state);
        terminal.draw(|frame| render(frame, &mut state, &style))?;

        if event::poll(Duration::from_millis(200))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && !handle_key(&mut state, key.code)
        {
            break;
        }
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let root = env::args()
        .nth(1)
        .map_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")), PathBuf::from);
    if !root.is_dir() {
        eprintln!("Path is not a directory: {}", root.display());
        return Ok(());
    }

    let options = TreeGridOptions::default()
        .name("demo")
        .row_height(1)
        .filter(FilterConfig::dim());
    let mut state = TreeGridState::with_options(&mut TreeRegistry::new(), options, RowCache::new());
    state.set_columns([
        ColumnDef::new(TREE_COLUMN, "Name"),
        ColumnDef::new("size", "Size").fixed(8),
        ColumnDef::new("modified", "Modified").fixed(17),
    ]);
    let top = state.tree().root();
    let batch = read_level(&root)?;
    if let Err(err) = state.add_children(top, &batch) {
        eprintln!("{err}");
        return Ok(());
    }

    let mut style = TreeGridStyle::default();
    style.block_style = Style::default()
        .fg(Color::Rgb(221, 227, 235))
        .bg(Color::Rgb(24, 28, 36));
    style.border_style = Style::default().fg(Color::Rgb(92, 110, 140));
    style.line_style = Style::default().fg(Color::Rgb(86, 98, 120));
    style.header_style = Style::default()
        .fg(Color::Rgb(229, 201, 133))
        .add_modifier(Modifier::BOLD);
    style.active_style = Style::default()
        .fg(Color::Rgb(255, 255, 255))
        .bg(Color::Rgb(52, 66, 96))
        .add_modifier(Modifier::BOLD);
    style.title = Some(Line::from(format!(
        "{} (f: filter *.rs, E/C: expand/collapse all)",
        root.display()
    )));

    let terminal = ratatui::init();
    let result = run_app(terminal, state, style);
    ratatui::restore();
    result
}
