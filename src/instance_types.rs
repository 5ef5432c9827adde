use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EmulatorType {
    Micro,      // 100K cycles/sec, 8KB memory
    Small,      // 500K cycles/sec, 32KB memory
    Standard,   // 1M cycles/sec, 64KB memory
    Performance,// 5M cycles/sec, 1MB memory
    Turbo,      // 10M cycles/sec, 16MB memory
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub boot_image: Vec<u8>,
    pub start_pc: u64,
    pub initial_memory: HashMap<u64, u8>,
    pub emulator_type: EmulatorType,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorSpecs {
    pub max_cycles_per_second: u64,
    pub memory_size: u64,
    pub execution_timeout_ms: u64,
    pub pricing_tier: PricingTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PricingTier {
    Free,
    Basic,
    Standard,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub template_id: Option<String>,
    pub emulator_type: Option<EmulatorType>,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub auto_start: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorInstance {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub emulator_type: EmulatorType,
    pub template_id: Option<String>,
    pub state: InstanceState,
    pub specs: EmulatorSpecs,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub tags: Vec<String>,
    pub usage_stats: UsageStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Paused,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_cycles: u64,
    pub total_instructions: u64,
    pub runtime_seconds: u64,
    pub api_calls: u64,
    pub last_reset: DateTime<Utc>,
}

impl EmulatorType {
    pub fn get_specs(&self) -> EmulatorSpecs {
        match self {
            EmulatorType::Micro => EmulatorSpecs {
                max_cycles_per_second: 100_000,
                memory_size: 8 * 1024,
                execution_timeout_ms: 1000,
                pricing_tier: PricingTier::Free,
            },
            EmulatorType::Small => EmulatorSpecs {
                max_cycles_per_second: 500_000,
                memory_size: 32 * 1024,
                execution_timeout_ms: 5000,
                pricing_tier: PricingTier::Basic,
            },
            EmulatorType::Standard => EmulatorSpecs {
                max_cycles_per_second: 1_000_000,
                memory_size: 64 * 1024,
                execution_timeout_ms: 10000,
                pricing_tier: PricingTier::Standard,
            },
            EmulatorType::Performance => EmulatorSpecs {
                max_cycles_per_second: 5_000_000,
                memory_size: 1024 * 1024,
                execution_timeout_ms: 30000,
                pricing_tier: PricingTier::Standard,
            },
            EmulatorType::Turbo => EmulatorSpecs {
                max_cycles_per_second: 10_000_000,
                memory_size: 16 * 1024 * 1024,
                execution_timeout_ms: 60000,
                pricing_tier: PricingTier::Premium,
            },
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            EmulatorType::Micro => "micro",
            EmulatorType::Small => "small",
            EmulatorType::Standard => "standard",
            EmulatorType::Performance => "performance",
            EmulatorType::Turbo => "turbo",
        }
    }
}

impl Default for EmulatorType {
    fn default() -> Self {
        EmulatorType::Standard
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            total_cycles: 0,
            total_instructions: 0,
            runtime_seconds: 0,
            api_calls: 0,
            last_reset: Utc::now(),
        }
    }
}

/// The bundled self-test image: builds a mask, runs a 0x1000-iteration
/// accumulation loop, assembles a 64-bit constant lane by lane, and stores
/// both results through the rotating word store before halting.
pub const SELFTEST_IMAGE: [u8; 44] = [
    0x1F,             // test $zpmn
    0x35,             // mt r5
    0x10,             // test 0
    0xF9, 0x42, 0x69, // addi $1x00, 0x6942
    0x10,             // test 0
    0xE0, 0x00, 0x10, // xori $000x, 0x1000
    0x38,             // mt r8
    0x29,             // mf r9
    0xF0, 0x47, 0x00, // addi $000x, 0x47
    0x39,             // mt r9
    0x28,             // mf r8
    0xF3, 0xFF, 0xFF, // addi $111x, -1
    0x82, 0xF3, 0xFF, // jump $p, -13
    0x29,             // mf r9
    0xBF, 0x00, 0x01, // st r15, 0x100
    0x10,             // test 0
    0xD0, 0x01, 0x23, // ori $000x, 0x2301
    0xD4, 0x45, 0x67, // ori $00x0, 0x6745
    0xD8, 0x89, 0xAB, // ori $0x00, 0xAB89
    0xDC, 0xCD, 0xEF, // ori $x000, 0xEFCD
    0xBF, 0x07, 0x02, // st r15, 0x207
    0x0F,             // halt
];

/// Minimal lane-masking demo: assembles 0xEFCDAB8967452301 in the
/// accumulator with one `ori` per 16-bit lane, then halts.
pub const MASK_BUILDER_IMAGE: [u8; 14] = [
    0x10,             // test 0
    0xD0, 0x01, 0x23, // ori $000x, 0x2301
    0xD4, 0x45, 0x67, // ori $00x0, 0x6745
    0xD8, 0x89, 0xAB, // ori $0x00, 0xAB89
    0xDC, 0xCD, 0xEF, // ori $x000, 0xEFCD
    0x0F,             // halt
];

impl InstanceTemplate {
    pub fn create_basic_templates() -> Vec<InstanceTemplate> {
        vec![
            InstanceTemplate {
                id: "bare".to_string(),
                name: "Bare Machine".to_string(),
                description: "Zero-filled memory; executes the null trap immediately, so load a program before stepping".to_string(),
                boot_image: vec![],
                start_pc: 0,
                initial_memory: HashMap::new(),
                emulator_type: EmulatorType::Standard,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["basic".to_string(), "clean".to_string()],
            },
            InstanceTemplate {
                id: "selftest".to_string(),
                name: "Self-Test Program".to_string(),
                description: "Reference program exercising masks, loops, lane-building and rotated word stores".to_string(),
                boot_image: SELFTEST_IMAGE.to_vec(),
                start_pc: 0,
                initial_memory: HashMap::new(),
                emulator_type: EmulatorType::Performance,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["selftest".to_string(), "reference".to_string()],
            },
            InstanceTemplate {
                id: "mask-builder".to_string(),
                name: "Mask Builder Demo".to_string(),
                description: "Builds a 64-bit constant one 16-bit lane at a time with pattern-extended ori".to_string(),
                boot_image: MASK_BUILDER_IMAGE.to_vec(),
                start_pc: 0,
                initial_memory: HashMap::new(),
                emulator_type: EmulatorType::Micro,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["demo".to_string(), "masks".to_string()],
            },
            InstanceTemplate {
                id: "development".to_string(),
                name: "Development System".to_string(),
                description: "Fast development environment with a large address space".to_string(),
                boot_image: vec![],
                start_pc: 0,
                initial_memory: {
                    let mut mem = HashMap::new();
                    mem.insert(0, 0x0B); // nop at the entry point
                    mem
                },
                emulator_type: EmulatorType::Turbo,
                created_by: "system".to_string(),
                created_at: Utc::now(),
                is_public: true,
                tags: vec!["development".to_string(), "debugging".to_string(), "fast".to_string()],
            },
        ]
    }
}

impl EmulatorInstance {
    pub fn new(
        owner_id: String,
        emulator_type: EmulatorType,
        name: Option<String>,
        template_id: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Self {
        let specs = emulator_type.get_specs();
        let instance_name = name.unwrap_or_else(|| {
            format!("{}-{}", emulator_type.to_string(), uuid::Uuid::new_v4().to_string()[..8].to_string())
        });

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: instance_name,
            owner_id,
            emulator_type,
            template_id,
            state: InstanceState::Stopped,
            specs,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            last_activity: Utc::now(),
            tags: tags.unwrap_or_default(),
            usage_stats: UsageStats::default(),
        }
    }

    pub fn start(&mut self) {
        self.state = InstanceState::Running;
        self.started_at = Some(Utc::now());
        self.last_activity = Utc::now();
    }

    pub fn stop(&mut self) {
        self.state = InstanceState::Stopped;
        self.stopped_at = Some(Utc::now());
        self.last_activity = Utc::now();
    }

    pub fn pause(&mut self) {
        self.state = InstanceState::Paused;
        self.last_activity = Utc::now();
    }

    pub fn record_activity(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn record_cycle(&mut self) {
        self.usage_stats.total_cycles += 1;
    }

    pub fn record_instruction(&mut self) {
        self.usage_stats.total_instructions += 1;
    }

    pub fn record_api_call(&mut self) {
        self.usage_stats.api_calls += 1;
    }

    pub fn get_runtime_seconds(&self) -> u64 {
        if let Some(started) = self.started_at {
            let end_time = if matches!(self.state, InstanceState::Running) {
                Utc::now()
            } else {
                self.stopped_at.unwrap_or(Utc::now())
            };

            (end_time - started).num_seconds() as u64
        } else {
            0
        }
    }

    pub fn is_idle(&self, idle_threshold_minutes: i64) -> bool {
        let idle_duration = Utc::now() - self.last_activity;
        idle_duration.num_minutes() > idle_threshold_minutes
    }

    pub fn can_user_access(&self, user_id: &str, is_admin: bool) -> bool {
        is_admin || self.owner_id == user_id
    }
}
