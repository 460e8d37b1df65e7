use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use guidedial::capture::{CaptureError, PointerCapture};
use guidedial::consts::{DEFAULT_KNOB_RANGE_DEG, KNOB_SIZE_PX, SLIDER_CONTAINER_HEIGHT_PX, SLIDER_TRACK_WIDTH_PX};
use guidedial::controller::{Controller, DragWidget};
use guidedial::geometry::{Bounds, Frame, Point, Viewport};
use guidedial::guide::linear::LinearGuide;
use guidedial::guide::radial::RadialGuide;
use guidedial::input::{Button, PointerEvent};
use guidedial::knob::{self, Knob, KnobFace, KnobPointer, KnobProps, KnobState};
use guidedial::palette::{Palette, PaletteError};
use guidedial::slider::{self, Slider, SliderFace, SliderPointer, SliderProps, SliderState};
use guidedial::tick::{self, TickPlan};
use guidedial::value_math::{format_tick_label, format_value, snap_to_step};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("failed to read input: {0}")]
    Input(#[from] io::Error),
    #[error(transparent)]
    Palette(#[from] PaletteError),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid event on line {line}: {source}")]
    InvalidEvent { line: usize, source: serde_json::Error },
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Parser, Debug)]
#[command(name = "guidedial", about = "Inspect knob and slider guide layouts")]
struct Cli {
    #[arg(long, env = "GUIDEDIAL_PALETTE", help = "Palette JSON overlay file")]
    palette: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tick plan for a guide of a given size.
    Plan(PlanArgs),
    /// Press a knob at an offset from its center.
    Knob(KnobArgs),
    /// Press a slider at a viewport position.
    Slider(SliderArgs),
    /// Format a value for display.
    Format(FormatArgs),
    /// Print the effective palette.
    Palette,
    /// Feed a JSONL pointer-event stream through a widget.
    Replay(ReplayArgs),
}

#[derive(Args, Debug, Clone, Copy)]
struct ValueRange {
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    min: f64,

    #[arg(long, default_value_t = 100.0, allow_negative_numbers = true)]
    max: f64,

    #[arg(long, default_value_t = 1.0)]
    step: f64,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[arg(long, conflicts_with = "radius", required_unless_present = "radius", help = "Guide line length in px")]
    length: Option<f64>,

    #[arg(long, help = "Guide circle radius in px")]
    radius: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_KNOB_RANGE_DEG, help = "Half-sweep in degrees, with --radius")]
    sweep: f64,

    #[command(flatten)]
    range: ValueRange,
}

#[derive(Args, Debug)]
struct KnobArgs {
    #[arg(long, allow_negative_numbers = true, help = "Pointer x offset from the knob center")]
    dx: f64,

    #[arg(long, allow_negative_numbers = true, help = "Pointer y offset from the knob center")]
    dy: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    value: f64,

    #[arg(long, default_value_t = DEFAULT_KNOB_RANGE_DEG)]
    sweep: f64,

    #[command(flatten)]
    range: ValueRange,
}

#[derive(Args, Debug)]
struct SliderArgs {
    #[arg(long, allow_negative_numbers = true, help = "Pointer x in viewport px")]
    x: f64,

    #[arg(long, allow_negative_numbers = true, help = "Pointer y in viewport px")]
    y: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    value: f64,

    #[command(flatten)]
    layout: SliderLayout,

    #[command(flatten)]
    range: ValueRange,
}

#[derive(Args, Debug, Clone, Copy)]
struct SliderLayout {
    #[arg(long, default_value_t = 0.0, help = "Slider left edge in viewport px")]
    left: f64,

    #[arg(long, default_value_t = 0.0, help = "Slider top edge in viewport px")]
    top: f64,

    #[arg(long, default_value_t = 1280.0)]
    viewport_width: f64,

    #[arg(long, default_value_t = 800.0)]
    viewport_height: f64,
}

impl SliderLayout {
    fn frame(self) -> Frame {
        Frame::new(
            Bounds::new(self.left, self.top, SLIDER_TRACK_WIDTH_PX, SLIDER_CONTAINER_HEIGHT_PX),
            Viewport::new(self.viewport_width, self.viewport_height),
        )
    }
}

#[derive(Args, Debug)]
struct FormatArgs {
    #[arg(long, allow_negative_numbers = true)]
    value: f64,

    #[arg(long, default_value_t = 1.0)]
    step: f64,

    #[arg(long, allow_negative_numbers = true, help = "Snap to multiples of --step from this origin")]
    origin: Option<f64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WidgetKind {
    Knob,
    Slider,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    #[arg(long, value_enum)]
    widget: WidgetKind,

    #[arg(long, default_value = "-", help = "Input file path, or - for stdin")]
    input: String,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    value: f64,

    #[arg(long, default_value_t = DEFAULT_KNOB_RANGE_DEG, help = "Knob half-sweep in degrees")]
    sweep: f64,

    #[command(flatten)]
    layout: SliderLayout,

    #[command(flatten)]
    range: ValueRange,
}

fn main() -> Result<(), CliError> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).inspect_err(|err| tracing::error!(error = %err, "command failed"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Plan(args) => run_plan(&args),
        Command::Knob(args) => run_knob(&args),
        Command::Slider(args) => run_slider(&args),
        Command::Format(args) => run_format(&args),
        Command::Palette => run_palette(cli.palette.as_deref()),
        Command::Replay(args) => run_replay(&args),
    }
}

// =============================================================
// plan / format / palette
// =============================================================

#[derive(Serialize)]
struct PlanReport {
    length: f64,
    #[serde(flatten)]
    plan: TickPlan,
    major_interval: usize,
    tick_count: usize,
}

fn run_plan(args: &PlanArgs) -> Result<(), CliError> {
    let ValueRange { min, max, step } = args.range;
    let (length, plan) = match (args.length, args.radius) {
        (Some(length), _) => (length, tick::plan_for_length(length, min, max, step)),
        (None, Some(radius)) => {
            (tick::arc_length(radius, args.sweep), tick::plan_for_radius(radius, args.sweep, min, max, step))
        }
        (None, None) => (0.0, tick::plan_for_length(0.0, min, max, step)),
    };
    tracing::debug!(length, tick_step = plan.tick_step, "planned ticks");
    print_json(&PlanReport {
        length,
        plan,
        major_interval: plan.major_interval(),
        tick_count: plan.tick_count(min, max),
    })
}

#[derive(Serialize)]
struct FormatReport {
    value: f64,
    readout: String,
    label: String,
}

fn run_format(args: &FormatArgs) -> Result<(), CliError> {
    let value = args.origin.map_or(args.value, |origin| snap_to_step(args.value, origin, args.step));
    print_json(&FormatReport {
        value,
        readout: format_value(value, args.step),
        label: format_tick_label(value, args.step),
    })
}

fn run_palette(path: Option<&Path>) -> Result<(), CliError> {
    let palette = match path {
        Some(path) => {
            let source = fs::read_to_string(path)
                .map_err(|source| CliError::Io { path: path.display().to_string(), source })?;
            Palette::from_json(&source)?
        }
        None => Palette::default(),
    };
    print_json(&palette)
}

// =============================================================
// knob / slider
// =============================================================

#[derive(Serialize)]
struct KnobReport {
    value: Option<f64>,
    pointer: Option<KnobPointer>,
    face: KnobFace,
    guide: Option<RadialGuide>,
}

fn knob_props(value: f64, sweep: f64, range: ValueRange) -> KnobProps {
    KnobProps { value, min: range.min, max: range.max, step: range.step, disabled: false, range: sweep }
}

fn run_knob(args: &KnobArgs) -> Result<(), CliError> {
    let mut props = knob_props(args.value, args.sweep, args.range);
    let bounds = Bounds::new(0.0, 0.0, KNOB_SIZE_PX, KNOB_SIZE_PX);
    let center = bounds.center();
    let point = Point::new(center.x + args.dx, center.y + args.dy);
    let frame = Frame::new(bounds, Viewport::default());

    let press = PointerEvent::Down { point, button: Button::Primary };
    let transition = Knob::transition(KnobState::Idle, &props, frame, press);
    if let Some(value) = transition.change {
        props.value = value;
    }
    let state = transition.next;
    print_json(&KnobReport {
        value: transition.change,
        pointer: state.drag().map(|drag| drag.pointer),
        face: knob::face(&state, &props, center),
        guide: knob::guide(&state, &props),
    })
}

#[derive(Serialize)]
struct SliderReport {
    value: Option<f64>,
    pointer: Option<SliderPointer>,
    face: SliderFace,
    guide: Option<LinearGuide>,
}

fn slider_props(value: f64, range: ValueRange) -> SliderProps {
    SliderProps { value, min: range.min, max: range.max, step: range.step, disabled: false }
}

fn run_slider(args: &SliderArgs) -> Result<(), CliError> {
    let mut props = slider_props(args.value, args.range);
    let press = PointerEvent::Down { point: Point::new(args.x, args.y), button: Button::Primary };
    let transition = Slider::transition(SliderState::Idle, &props, args.layout.frame(), press);
    if let Some(value) = transition.change {
        props.value = value;
    }
    let state = transition.next;
    print_json(&SliderReport {
        value: transition.change,
        pointer: state.drag().map(|drag| drag.pointer),
        face: slider::face(&state, &props, SLIDER_TRACK_WIDTH_PX, SLIDER_CONTAINER_HEIGHT_PX),
        guide: slider::guide(&state, &props),
    })
}

// =============================================================
// replay
// =============================================================

/// One line of a replay stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ReplayEvent {
    Down {
        x: f64,
        y: f64,
        #[serde(default)]
        button: i16,
    },
    Move {
        x: f64,
        y: f64,
    },
    Up {
        x: f64,
        y: f64,
    },
    Cancel,
}

impl ReplayEvent {
    /// `None` for buttons the DOM has no mapping for.
    fn to_pointer(&self) -> Option<PointerEvent> {
        match *self {
            ReplayEvent::Down { x, y, button } => {
                Button::from_dom(button).map(|button| PointerEvent::Down { point: Point::new(x, y), button })
            }
            ReplayEvent::Move { x, y } => Some(PointerEvent::Move { point: Point::new(x, y) }),
            ReplayEvent::Up { x, y } => Some(PointerEvent::Up { point: Point::new(x, y) }),
            ReplayEvent::Cancel => Some(PointerEvent::Cancel),
        }
    }
}

#[derive(Serialize)]
struct ReplayStep {
    line: usize,
    change: Option<f64>,
    value: f64,
    dragging: bool,
}

/// Capture that always succeeds; the replay has no window to subscribe to.
struct Detached;

impl PointerCapture for Detached {
    type Guard = ();

    fn capture(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
}

/// A widget's value as the host sees it.
trait HostValue: DragWidget {
    fn value(props: &Self::Props) -> f64;
    fn commit(props: &mut Self::Props, value: f64);
}

impl HostValue for Knob {
    fn value(props: &KnobProps) -> f64 {
        props.value
    }

    fn commit(props: &mut KnobProps, value: f64) {
        props.value = value;
    }
}

impl HostValue for Slider {
    fn value(props: &SliderProps) -> f64 {
        props.value
    }

    fn commit(props: &mut SliderProps, value: f64) {
        props.value = value;
    }
}

fn run_replay(args: &ReplayArgs) -> Result<(), CliError> {
    let reader = open_input(&args.input)?;
    match args.widget {
        WidgetKind::Knob => {
            let props = knob_props(args.value, args.sweep, args.range);
            let frame = Frame::new(Bounds::new(0.0, 0.0, KNOB_SIZE_PX, KNOB_SIZE_PX), Viewport::default());
            replay::<Knob>(reader, props, frame)
        }
        WidgetKind::Slider => replay::<Slider>(reader, slider_props(args.value, args.range), args.layout.frame()),
    }
}

fn replay<W: HostValue>(reader: Box<dyn BufRead>, props: W::Props, frame: Frame) -> Result<(), CliError> {
    let mut controller = Controller::<W, Detached>::new(props, Detached);
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let number = index + 1;
        let event: ReplayEvent =
            serde_json::from_str(trimmed).map_err(|source| CliError::InvalidEvent { line: number, source })?;
        let Some(pointer) = event.to_pointer() else {
            tracing::warn!(line = number, "skipping event with unknown button");
            continue;
        };

        let change = controller.handle(frame, pointer)?;
        if let Some(value) = change {
            let mut next = controller.props().clone();
            W::commit(&mut next, value);
            controller.set_props(next);
        }
        print_json_line(&ReplayStep {
            line: number,
            change,
            value: W::value(controller.props()),
            dragging: controller.is_dragging(),
        })?;
    }
    Ok(())
}

fn open_input(input: &str) -> Result<Box<dyn BufRead>, CliError> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(input).map_err(|source| CliError::Io { path: input.to_owned(), source })?;
    Ok(Box::new(BufReader::new(file)))
}

// =============================================================
// Output
// =============================================================

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

fn print_json_line<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}
