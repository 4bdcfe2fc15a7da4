use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{KeyCode, KeyModifiers};
use crossterm::terminal::size;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::{Frame, Terminal};
use tracing::Level;

use window_tree_server::client::TracingConnection;
use window_tree_server::delegate::{LocalEventSink, PolicyDelegate};
use window_tree_server::drivers::console::{ConsoleInputDriver, TerminalSession};
use window_tree_server::drivers::translate::TerminalInput;
use window_tree_server::event_loop::{ControlFlow, EventLoop};
use window_tree_server::events::{Event, MouseEventKind};
use window_tree_server::properties::{NAME, Properties, WINDOW_TYPE, WindowType};
use window_tree_server::{
    ClientId, DispatchReport, Insets, Point, Rect, RouteDecision, ServiceConfig, WindowId,
    WindowService, tracing_sub, view,
};

const MAX_WINDOWS: u32 = 6;

#[derive(Parser, Debug)]
#[command(
    name = "window-tree-server",
    version = env!("CARGO_PKG_VERSION"),
    about = "Interactive demo: client windows on a terminal-sized display with server-side chrome"
)]
struct Cli {
    /// Number of demo clients, each with one top-level window.
    #[arg(short = 'w', long = "windows", value_name = "COUNT", default_value_t = 2)]
    windows: u32,

    /// Rows at the top of each window that belong to the server (title bar).
    #[arg(long = "title-rows", value_name = "ROWS", default_value_t = 1)]
    title_rows: i32,

    /// Append logs here instead of writing them to stderr.
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Fixed display size instead of the terminal size, e.g. 120x40.
    #[arg(long = "display", value_name = "WxH")]
    display: Option<String>,

    /// Idle redraw interval.
    #[arg(long = "tick-ms", value_name = "MILLIS", default_value_t = 16)]
    tick_ms: u64,
}

struct DemoConfig {
    windows: u32,
    title_rows: i32,
    log_file: Option<PathBuf>,
    level: Level,
    tick: Duration,
    display: Option<(u16, u16)>,
}

fn parse_display(text: &str) -> Result<(u16, u16), String> {
    let (w, h) = text
        .split_once('x')
        .ok_or_else(|| format!("display must look like 120x40, got {text:?}"))?;
    let width: u16 = w.trim().parse().map_err(|_| format!("bad display width {w:?}"))?;
    let height: u16 = h.trim().parse().map_err(|_| format!("bad display height {h:?}"))?;
    if width < 20 || height < 8 {
        return Err("display must be at least 20x8".to_string());
    }
    Ok((width, height))
}

impl TryFrom<&Cli> for DemoConfig {
    type Error = String;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        if !(1..=MAX_WINDOWS).contains(&cli.windows) {
            return Err(format!("windows must be between 1 and {MAX_WINDOWS}"));
        }
        if !(0..=4).contains(&cli.title_rows) {
            return Err("title rows must be between 0 and 4".to_string());
        }
        if !(1..=1000).contains(&cli.tick_ms) {
            return Err("tick must be between 1 and 1000 ms".to_string());
        }
        let level = match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let display = cli.display.as_deref().map(parse_display).transpose()?;
        Ok(Self {
            windows: cli.windows,
            title_rows: cli.title_rows,
            log_file: cli.log_file.clone(),
            level,
            tick: Duration::from_millis(cli.tick_ms),
            display,
        })
    }
}

fn main() -> io::Result<()> {
    let args = Cli::parse();
    let config = DemoConfig::try_from(&args)
        .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;
    // Stderr would scribble over the screen, so only warnings go there.
    let level = if config.log_file.is_some() {
        config.level
    } else {
        Level::WARN
    };
    tracing_sub::init(config.log_file.as_deref(), level)?;

    let (width, height) = match config.display {
        Some(fixed) => fixed,
        None => size()?,
    };
    let display = Rect::new(0, 0, i32::from(width), i32::from(height).saturating_sub(1));
    let mut demo = Demo::new(&config, display)?;

    let mut session = TerminalSession::stdout();
    session.enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let mut event_loop = EventLoop::new(ConsoleInputDriver::new(), config.tick);
    let result = event_loop.run(|_, input| demo.handle(input, &mut terminal));
    session.exit()?;
    result?;
    println!("{}", demo.summary());
    Ok(())
}

/// How the router disposed of the events the demo dispatched.
#[derive(Debug, Default)]
struct RouteCounts {
    local: u64,
    remote: u64,
    shared: u64,
}

impl RouteCounts {
    fn record(&mut self, decision: RouteDecision) {
        match decision {
            RouteDecision::Local => self.local += 1,
            RouteDecision::Remote { .. } => self.remote += 1,
            RouteDecision::Shared { .. } => self.shared += 1,
        }
    }
}

/// Chrome events the router kept for the server.
#[derive(Clone, Default)]
struct ChromeEvents(Rc<RefCell<VecDeque<(WindowId, Event)>>>);

impl LocalEventSink for ChromeEvents {
    fn on_local_event(&mut self, window: WindowId, event: &Event) {
        self.0.borrow_mut().push_back((window, *event));
    }
}

/// A title-bar drag in progress.
struct ChromeDrag {
    window: WindowId,
    grab: Point,
    start_bounds: Rect,
}

struct Demo {
    service: WindowService,
    root: WindowId,
    chrome: ChromeEvents,
    drag: Option<ChromeDrag>,
    status: String,
    dirty: bool,
    counts: RouteCounts,
    /// False when the display size was fixed on the command line.
    follow_terminal: bool,
}

impl Demo {
    fn new(config: &DemoConfig, display: Rect) -> io::Result<Self> {
        let service_config = ServiceConfig::default().with_display(display);
        let delegate = PolicyDelegate::new(service_config.default_top_level_bounds);
        let chrome = ChromeEvents::default();
        let mut service = WindowService::new(service_config, Box::new(delegate))
            .with_local_event_sink(Box::new(chrome.clone()));
        let root = service
            .roots()
            .first()
            .copied()
            .ok_or_else(|| io::Error::other("no display root"))?;

        let width = (display.width / 2).max(12);
        let height = (display.height / 2).max(6);
        for n in 0..config.windows {
            let client = service
                .create_client_tree(Box::new(TracingConnection::new(format!("client-{n}"))))
                .map_err(io::Error::other)?;
            let offset = 3 * n as i32;
            let bounds = Rect::new(2 + offset * 2, 1 + offset, width, height);
            if !open_top_level(&mut service, client, bounds, config.title_rows, n) {
                return Err(io::Error::other(format!("client-{n} could not open its window")));
            }
        }

        Ok(Self {
            service,
            root,
            chrome,
            drag: None,
            status: "drag title bars to move windows; q quits".to_string(),
            dirty: true,
            counts: RouteCounts::default(),
            follow_terminal: config.display.is_none(),
        })
    }

    fn handle<B>(&mut self, input: Option<TerminalInput>, terminal: &mut Terminal<B>) -> io::Result<ControlFlow>
    where
        B: Backend,
    {
        match input {
            None => {
                if self.dirty {
                    terminal
                        .draw(|frame| self.draw(frame))
                        .map_err(|e| io::Error::other(e.to_string()))?;
                    self.dirty = false;
                }
            }
            Some(TerminalInput::Resize { width, height }) if self.follow_terminal => {
                let bounds = Rect::new(0, 0, i32::from(width), i32::from(height).saturating_sub(1));
                self.service.set_local_bounds(self.root, bounds);
                self.dirty = true;
            }
            Some(TerminalInput::Resize { .. }) => self.dirty = true,
            Some(TerminalInput::Event(Event::Key(key)))
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)) =>
            {
                return Ok(ControlFlow::Quit);
            }
            Some(TerminalInput::Event(event)) => {
                let report = self.service.dispatch_event(event);
                self.counts.record(report.decision);
                if event.is_pointer_press()
                    && let Some(target) = report.target
                {
                    self.activate(target);
                }
                self.apply_chrome(&event);
                self.status = describe_report(&event, &report);
                self.dirty = true;
            }
        }
        Ok(ControlFlow::Continue)
    }

    /// Raises and focuses the top-level containing `target`.
    fn activate(&mut self, target: WindowId) {
        let hierarchy = self.service.hierarchy();
        let top_level = std::iter::once(target)
            .chain(hierarchy.ancestors(target))
            .find(|w| hierarchy.parent(*w) == Some(self.root));
        if let Some(top_level) = top_level {
            self.service.set_local_focus(Some(top_level));
        }
    }

    fn apply_chrome(&mut self, raw: &Event) {
        let Some(screen) = raw.location() else {
            self.chrome.0.borrow_mut().clear();
            return;
        };
        let pending: Vec<_> = self.chrome.0.borrow_mut().drain(..).collect();
        for (window, event) in pending {
            let Event::Mouse(mouse) = event else {
                continue;
            };
            match mouse.kind {
                MouseEventKind::Pressed => {
                    if let Some(bounds) = self.service.hierarchy().bounds(window) {
                        tracing::debug!(window_id = ?window, "chrome drag started");
                        self.drag = Some(ChromeDrag {
                            window,
                            grab: screen,
                            start_bounds: bounds,
                        });
                    }
                }
                MouseEventKind::Dragged => {
                    if let Some(drag) = &self.drag
                        && drag.window == window
                    {
                        let dx = screen.x - drag.grab.x;
                        let dy = screen.y - drag.grab.y;
                        let b = drag.start_bounds;
                        let moved = Rect::new(b.x + dx, b.y + dy, b.width, b.height);
                        self.service.set_local_bounds(window, moved);
                    }
                }
                MouseEventKind::Released => {
                    self.drag = None;
                }
                _ => {}
            }
        }
    }

    fn summary(&self) -> String {
        let clients = self.service.client_ids().count();
        let windows = self.service.hierarchy().len();
        indoc::formatdoc!(
            r#"
            Session ended.
            Clients: {clients} | Windows: {windows}
            Events kept local: {local} | sent to clients: {remote} | shared: {shared}
            "#,
            local = self.counts.local,
            remote = self.counts.remote,
            shared = self.counts.shared,
        )
    }

    fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let buf = frame.buffer_mut();
        view::render_windows(&self.service, self.root, area, buf);
        view::render_status(&self.status, area, buf);
    }
}

fn open_top_level(service: &mut WindowService, client: ClientId, bounds: Rect, title_rows: i32, n: u32) -> bool {
    let window = WindowId::new(client, 1);
    let properties: Properties = [
        (WINDOW_TYPE, WindowType::Normal.to_property()),
        (NAME, format!("client-{n}").into_bytes()),
    ]
    .into_iter()
    .collect();
    let mut tree = service.client(client);
    if !tree.new_top_level_window(1, window, properties) {
        return false;
    }
    // Top-level bounds apply but complete unsuccessfully, since the server
    // assigns the surface id.
    tree.set_window_bounds(2, window, bounds, None);
    tree.set_client_area(window, Insets::top(title_rows), Vec::new()) && tree.set_window_visibility(3, window, true)
}

fn describe_report(event: &Event, report: &DispatchReport) -> String {
    let target = report
        .target
        .map_or_else(|| "none".to_string(), |w| w.to_string());
    let decision = match report.decision {
        RouteDecision::Local => "local".to_string(),
        RouteDecision::Remote { client, window } => format!("client {client} at {window}"),
        RouteDecision::Shared { client, window } => format!("shared: client {client} at {window} + local"),
    };
    format!("{} -> target {target}: {decision}", event.describe())
}
