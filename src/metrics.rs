use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::time::{Duration, Instant};

use crate::cpu::condition_category;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for total CPU instructions executed by opcode
    pub static ref CPU_INSTRUCTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cpu_instructions_total", "Total number of CPU instructions executed by opcode"),
        &["opcode", "instruction"]
    ).expect("Failed to create CPU instructions counter");

    /// Counter for CPU cycles executed
    pub static ref CPU_CYCLES_TOTAL: Counter = Counter::new(
        "cpu_cycles_total", "Total number of CPU cycles executed"
    ).expect("Failed to create CPU cycles counter");

    /// Histogram for instruction execution time
    pub static ref INSTRUCTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("instruction_duration_seconds", "Time spent executing instructions")
            .buckets(vec![0.000001, 0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001]),
        &["instruction"]
    ).expect("Failed to create instruction duration histogram");

    /// Counter for API requests by endpoint and method
    pub static ref API_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("api_requests_total", "Total number of API requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create API requests counter");

    /// Histogram for API request duration
    pub static ref API_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("api_request_duration_seconds", "API request duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["method", "endpoint"]
    ).expect("Failed to create API request duration histogram");

    /// Gauge for active emulator instances
    pub static ref ACTIVE_EMULATORS: Gauge = Gauge::new(
        "active_emulators_total", "Number of active emulator instances"
    ).expect("Failed to create active emulators gauge");

    /// Gauge for CPU register values by emulator ID
    pub static ref CPU_REGISTER_VALUES: GaugeVec = GaugeVec::new(
        Opts::new("cpu_register_value", "Current CPU register values"),
        &["emulator_id", "register"]
    ).expect("Failed to create CPU register values gauge");

    /// Counter for memory operations
    pub static ref MEMORY_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("memory_operations_total", "Total memory read/write operations"),
        &["operation", "emulator_id"]
    ).expect("Failed to create memory operations counter");

    /// Gauge for the accumulator condition category (0 or 1 per class)
    pub static ref CONDITION_CATEGORY: GaugeVec = GaugeVec::new(
        Opts::new("cpu_condition_category", "Which accumulator condition class is active"),
        &["emulator_id", "category"]
    ).expect("Failed to create condition category gauge");

    /// Counter for emulator resets
    pub static ref EMULATOR_RESETS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("emulator_resets_total", "Total number of emulator resets"),
        &["emulator_id"]
    ).expect("Failed to create emulator resets counter");

    /// Counter for program loads
    pub static ref PROGRAM_LOADS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("program_loads_total", "Total number of programs loaded"),
        &["emulator_id"]
    ).expect("Failed to create program loads counter");
}

/// Initialize Prometheus metrics by registering them with the global registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(CPU_INSTRUCTIONS_TOTAL.clone()))
        .expect("Failed to register CPU instructions counter");

    REGISTRY
        .register(Box::new(CPU_CYCLES_TOTAL.clone()))
        .expect("Failed to register CPU cycles counter");

    REGISTRY
        .register(Box::new(INSTRUCTION_DURATION.clone()))
        .expect("Failed to register instruction duration histogram");

    REGISTRY
        .register(Box::new(API_REQUESTS_TOTAL.clone()))
        .expect("Failed to register API requests counter");

    REGISTRY
        .register(Box::new(API_REQUEST_DURATION.clone()))
        .expect("Failed to register API request duration histogram");

    REGISTRY
        .register(Box::new(ACTIVE_EMULATORS.clone()))
        .expect("Failed to register active emulators gauge");

    REGISTRY
        .register(Box::new(CPU_REGISTER_VALUES.clone()))
        .expect("Failed to register CPU register values gauge");

    REGISTRY
        .register(Box::new(MEMORY_OPERATIONS_TOTAL.clone()))
        .expect("Failed to register memory operations counter");

    REGISTRY
        .register(Box::new(CONDITION_CATEGORY.clone()))
        .expect("Failed to register condition category gauge");

    REGISTRY
        .register(Box::new(EMULATOR_RESETS_TOTAL.clone()))
        .expect("Failed to register emulator resets counter");

    REGISTRY
        .register(Box::new(PROGRAM_LOADS_TOTAL.clone()))
        .expect("Failed to register program loads counter");
}

/// Record a CPU instruction execution
pub fn record_instruction(opcode: u8, instruction_name: &str, duration: Duration) {
    CPU_INSTRUCTIONS_TOTAL
        .with_label_values(&[&format!("0x{:02X}", opcode), instruction_name])
        .inc();

    CPU_CYCLES_TOTAL.inc();

    INSTRUCTION_DURATION
        .with_label_values(&[instruction_name])
        .observe(duration.as_secs_f64());
}

/// Record an API request
pub fn record_api_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    API_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    API_REQUEST_DURATION
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Update emulator count
pub fn set_active_emulators(count: usize) {
    ACTIVE_EMULATORS.set(count as f64);
}

/// Update CPU register metrics for an emulator
pub fn update_cpu_registers(emulator_id: &str, pc: u64, acc: u64, sr: u64, lr: u64) {
    CPU_REGISTER_VALUES
        .with_label_values(&[emulator_id, "pc"])
        .set(pc as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[emulator_id, "acc"])
        .set(acc as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[emulator_id, "sr"])
        .set(sr as f64);

    CPU_REGISTER_VALUES
        .with_label_values(&[emulator_id, "lr"])
        .set(lr as f64);

    // Track which accumulator class the condition scheme would see
    update_condition_category(emulator_id, acc);
}

/// Update the accumulator condition-category metrics for an emulator
pub fn update_condition_category(emulator_id: &str, acc: u64) {
    let active = condition_category(acc);
    for (category, name) in ["zero", "positive", "min_negative", "negative"]
        .into_iter()
        .enumerate()
    {
        CONDITION_CATEGORY
            .with_label_values(&[emulator_id, name])
            .set(if category as u8 == active { 1.0 } else { 0.0 });
    }
}

/// Record a memory operation
pub fn record_memory_operation(operation: &str, emulator_id: &str) {
    MEMORY_OPERATIONS_TOTAL
        .with_label_values(&[operation, emulator_id])
        .inc();
}

/// Record an emulator reset
pub fn record_emulator_reset(emulator_id: &str) {
    EMULATOR_RESETS_TOTAL
        .with_label_values(&[emulator_id])
        .inc();
}

/// Record a program load
pub fn record_program_load(emulator_id: &str) {
    PROGRAM_LOADS_TOTAL
        .with_label_values(&[emulator_id])
        .inc();
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the assembly mnemonic for an opcode byte, for metrics labels
pub fn get_instruction_name(opcode: u8) -> &'static str {
    match opcode >> 4 {
        // The no-literal control group dispatches on the argument nibble
        0x0 => match opcode & 0xF {
            0x0 => "null",
            0x1 => "trace",
            0x2 => "sys",
            0x3 => "ext",
            0x4 => "mfsr",
            0x5 => "mtsr",
            0x6 => "shl",
            0x7 => "shr",
            0x8 => "ja",
            0x9 => "ca",
            0xA => "ret",
            0xB => "nop",
            0xC => "mflr",
            0xD => "mtlr",
            0xE => "adr",
            0xF => "halt",
            _ => unreachable!(),
        },

        // Condition test
        0x1 => "test",

        // Register moves
        0x2 => "mf",
        0x3 => "mt",

        // Register arithmetic/logic
        0x4 => "and",
        0x5 => "or",
        0x6 => "xor",
        0x7 => "add",

        // Conditional control transfer
        0x8 => "jump",
        0x9 => "call",

        // Memory access
        0xA => "ld",
        0xB => "st",

        // Immediate arithmetic/logic
        0xC => "andi",
        0xD => "ori",
        0xE => "xori",
        0xF => "addi",

        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_names() {
        assert_eq!(get_instruction_name(0x00), "null");
        assert_eq!(get_instruction_name(0x0F), "halt");
        assert_eq!(get_instruction_name(0x1F), "test");
        assert_eq!(get_instruction_name(0x35), "mt");
        assert_eq!(get_instruction_name(0x82), "jump");
        assert_eq!(get_instruction_name(0xBF), "st");
        assert_eq!(get_instruction_name(0xF9), "addi");
    }
}
