use std::cell::Cell;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use crossterm::event::{KeyCode, KeyModifiers};
use window_tree_server::client::{ClientConnection, ClientMessage};
use window_tree_server::embedding::EmbedFlags;
use window_tree_server::events::{Event, KeyEvent, MouseButtons, MouseEvent};
use window_tree_server::properties::{Properties, WINDOW_TYPE, WindowType};
use window_tree_server::{ClientId, Insets, Point, Rect, RouteDecision, ServiceConfig, WindowId, WindowService};

const DISPLAY: Rect = Rect::new(0, 0, 1920, 1080);

#[derive(Parser, Debug)]
#[command(
    name = "route-bench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Synthetic input benchmark for the window-tree router"
)]
struct BenchCli {
    /// How long to run the benchmark.
    #[arg(
        short = 'd',
        long = "duration",
        value_name = "SECONDS",
        default_value_t = 5.0
    )]
    duration_seconds: f64,

    /// Number of client top-levels on the display.
    #[arg(short = 'w', long = "windows", value_name = "COUNT", default_value_t = 16)]
    windows: u32,

    /// Depth of nested child windows inside each top-level.
    #[arg(long = "depth", value_name = "LEVELS", default_value_t = 4)]
    depth: u32,

    /// Embed an intercepting client into every Nth top-level (0 disables).
    #[arg(long = "intercept-every", value_name = "N", default_value_t = 4)]
    intercept_every: u32,
}

struct BenchConfig {
    duration: Duration,
    windows: u32,
    depth: u32,
    intercept_every: u32,
}

impl TryFrom<&BenchCli> for BenchConfig {
    type Error = String;

    fn try_from(cli: &BenchCli) -> Result<Self, Self::Error> {
        if !(0.1..=600.0).contains(&cli.duration_seconds) {
            return Err("duration must be between 0.1 and 600 seconds".to_string());
        }
        if !(1..=512).contains(&cli.windows) {
            return Err("windows must be between 1 and 512".to_string());
        }
        if cli.depth > 32 {
            return Err("depth must be at most 32".to_string());
        }
        Ok(Self {
            duration: Duration::from_secs_f64(cli.duration_seconds),
            windows: cli.windows,
            depth: cli.depth,
            intercept_every: cli.intercept_every,
        })
    }
}

fn main() -> io::Result<()> {
    let args = BenchCli::parse();
    let config = BenchConfig::try_from(&args)
        .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;

    let delivered = Rc::new(Cell::new(0u64));
    let mut rng = Lcg::seeded_from_clock();
    let mut service = build_scene(&config, &delivered, &mut rng)
        .ok_or_else(|| io::Error::other("failed to build the benchmark scene"))?;

    let stats = run_benchmark(&mut service, &config, &mut rng, &delivered);
    println!("{}", stats.final_report(&config));
    Ok(())
}

/// Counts messages instead of sending them anywhere.
struct CountingConnection {
    delivered: Rc<Cell<u64>>,
}

impl ClientConnection for CountingConnection {
    fn send(&mut self, _message: ClientMessage) {
        self.delivered.set(self.delivered.get() + 1);
    }
}

fn connect(service: &mut WindowService, delivered: &Rc<Cell<u64>>) -> Option<ClientId> {
    service
        .create_client_tree(Box::new(CountingConnection {
            delivered: Rc::clone(delivered),
        }))
        .ok()
}

fn build_scene(config: &BenchConfig, delivered: &Rc<Cell<u64>>, rng: &mut Lcg) -> Option<WindowService> {
    let mut service = WindowService::with_default_policy(ServiceConfig::default().with_display(DISPLAY));
    let mut change_id = 0;
    let mut next_change = move || {
        change_id += 1;
        change_id
    };

    for index in 0..config.windows {
        let client = connect(&mut service, delivered)?;
        let top = WindowId::new(client, 1);
        let properties: Properties = [(WINDOW_TYPE, WindowType::Normal.to_property())]
            .into_iter()
            .collect();
        let bounds = Rect::new(
            (rng.next() % 1600) as i32,
            (rng.next() % 800) as i32,
            320,
            240,
        );
        let mut tree = service.client(client);
        if !tree.new_top_level_window(next_change(), top, properties) {
            return None;
        }
        // Applied even though it completes unsuccessfully: the server owns
        // the top-level's surface id.
        tree.set_window_bounds(next_change(), top, bounds, None);
        let ok = tree.set_window_visibility(next_change(), top, true)
            && tree.set_client_area(top, Insets::top(24), Vec::new());
        if !ok {
            return None;
        }

        let mut parent = top;
        for level in 0..config.depth {
            let child = WindowId::new(client, level + 2);
            let inset = 8 * (level as i32 + 1);
            let child_bounds = Rect::new(inset, 24 + inset, 320 - 2 * inset, 216 - 2 * inset);
            let ok = tree.new_window(next_change(), child, Properties::new())
                && tree.add_child(next_change(), parent, child)
                && tree.set_window_bounds(next_change(), child, child_bounds, None)
                && tree.set_window_visibility(next_change(), child, true);
            if !ok {
                return None;
            }
            parent = child;
        }

        if config.intercept_every > 0 && index % config.intercept_every == 0 {
            let embedded = Box::new(CountingConnection {
                delivered: Rc::clone(delivered),
            });
            service
                .client(client)
                .embed(parent, Some(embedded), EmbedFlags::INTERCEPT_EVENTS);
        }
    }
    Some(service)
}

fn run_benchmark(
    service: &mut WindowService,
    config: &BenchConfig,
    rng: &mut Lcg,
    delivered: &Rc<Cell<u64>>,
) -> BenchStats {
    let mut stats = BenchStats::new();
    let baseline = delivered.get();

    while stats.elapsed() < config.duration {
        // One burst: move, press, a few drags, release, then a key.
        let start = Point::new(
            (rng.next() % DISPLAY.width as u32) as i32,
            (rng.next() % DISPLAY.height as u32) as i32,
        );
        let mut script = vec![
            Event::Mouse(MouseEvent::moved(start)),
            Event::Mouse(MouseEvent::press(start, MouseButtons::LEFT)),
        ];
        let mut at = start;
        for _ in 0..4 {
            at = at.offset((rng.next() % 9) as i32 - 4, (rng.next() % 9) as i32 - 4);
            script.push(Event::Mouse(MouseEvent::drag(at, MouseButtons::LEFT)));
        }
        script.push(Event::Mouse(MouseEvent::release(at, MouseButtons::LEFT)));
        script.push(Event::Key(KeyEvent::press(KeyCode::Char('x'), KeyModifiers::NONE)));

        for event in script {
            let started = Instant::now();
            let report = service.dispatch_event(event);
            stats.record(report.decision, started.elapsed());
        }
    }

    stats.messages = delivered.get() - baseline;
    stats.mark_completed();
    stats
}

struct BenchStats {
    start: Instant,
    completed_at: Option<Instant>,
    events: u64,
    local: u64,
    remote: u64,
    shared: u64,
    messages: u64,
    total_route_time: Duration,
    slowest_event: Duration,
}

impl BenchStats {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            completed_at: None,
            events: 0,
            local: 0,
            remote: 0,
            shared: 0,
            messages: 0,
            total_route_time: Duration::ZERO,
            slowest_event: Duration::ZERO,
        }
    }

    fn elapsed(&self) -> Duration {
        match self.completed_at {
            Some(done) => done.duration_since(self.start),
            None => self.start.elapsed(),
        }
    }

    fn mark_completed(&mut self) {
        self.completed_at = Some(Instant::now());
    }

    fn record(&mut self, decision: RouteDecision, took: Duration) {
        self.events = self.events.saturating_add(1);
        match decision {
            RouteDecision::Local => self.local += 1,
            RouteDecision::Remote { .. } => self.remote += 1,
            RouteDecision::Shared { .. } => self.shared += 1,
        }
        self.total_route_time += took;
        if took > self.slowest_event {
            self.slowest_event = took;
        }
    }

    fn average_event_us(&self) -> f64 {
        if self.events == 0 {
            return 0.0;
        }
        (self.total_route_time.as_secs_f64() / self.events as f64) * 1_000_000.0
    }

    fn final_report(&self, config: &BenchConfig) -> String {
        let elapsed = self.elapsed().as_secs_f64();
        let events_per_second = if elapsed > 0.0 {
            self.events as f64 / elapsed
        } else {
            0.0
        };

        indoc::formatdoc!(
            r#"
            Route bench completed.
            Scene: {windows} top-levels, depth {depth}, intercepting embed every {every}
            Duration: {elapsed:.2}s (target {target:.2}s)
            Events: {events} (~{eps:.0}/s) | Avg: {avg:.2} us | Worst: {worst:.2} us
            Decisions: local {local} | remote {remote} | shared {shared}
            Client messages: {messages}
            "#,
            windows = config.windows,
            depth = config.depth,
            every = config.intercept_every,
            elapsed = elapsed,
            target = config.duration.as_secs_f64(),
            events = self.events,
            eps = events_per_second,
            avg = self.average_event_us(),
            worst = self.slowest_event.as_secs_f64() * 1_000_000.0,
            local = self.local,
            remote = self.remote,
            shared = self.shared,
            messages = self.messages,
        )
    }
}

struct Lcg {
    state: u64,
}

impl Lcg {
    fn seeded_from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            ^ 0xA5A5_A5A5_1234_5678;
        Self { state: seed }
    }

    fn next(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }
}
