use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};
use warp::Filter;
use prometheus::Encoder;

use crate::cpu::{HaltOnTrap, TrapHandler, CPU};
use crate::error::EmulatorError;
use crate::memory::Memory;
use crate::metrics::{
    init_metrics, record_api_request, set_active_emulators, update_cpu_registers,
    record_memory_operation, record_emulator_reset, record_program_load, Timer, REGISTRY
};
use crate::auth::{
    User, UserStore, init_default_users, with_permission, Permission,
    LoginRequest, AuthResponse, create_jwt_token, verify_login,
};
use crate::instance_types::{
    EmulatorInstance, InstanceTemplate, CreateInstanceRequest,
};
use crate::snapshots::{
    EmulatorSnapshot, SnapshotStore, CreateSnapshotRequest, RestoreSnapshotRequest,
    SnapshotListResponse, CheckpointReason,
};

#[derive(Debug, Clone, Serialize)]
pub struct CpuState {
    pub pc: u64,
    pub acc: u64,
    pub sr: u64,
    pub lr: u64,
    pub gpr: [u64; 16],
    pub cycles: u64,
    pub halted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmulatorState {
    pub id: String,
    pub cpu: CpuState,
}

#[derive(Debug, Deserialize)]
pub struct MemoryWrite {
    pub address: u64,
    pub value: u8,
}

#[derive(Debug, Deserialize)]
pub struct MemoryRead {
    pub address: u64,
    pub length: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MemoryData {
    pub address: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct ProgramLoad {
    pub address: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSteps {
    pub steps: u32,
}

#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub steps_executed: u32,
    pub halted: bool,
    pub fault: Option<String>,
    pub final_state: CpuState,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

pub struct Emulator {
    pub cpu: CPU,
    pub memory: Memory,
    pub traps: Box<dyn TrapHandler>,
    pub instance: EmulatorInstance,
}

impl Emulator {
    pub fn new_with_instance(instance: EmulatorInstance) -> Self {
        let memory = Memory::new(instance.specs.memory_size);
        Self {
            cpu: CPU::new(),
            memory,
            traps: Box::new(HaltOnTrap),
            instance,
        }
    }

    pub fn new() -> Self {
        // Default instance for backward compatibility
        let default_instance = EmulatorInstance::new(
            "system".to_string(),
            Default::default(),
            Some("default".to_string()),
            None,
            None,
        );
        Self::new_with_instance(default_instance)
    }

    pub fn get_state(&self) -> CpuState {
        CpuState {
            pc: self.cpu.get_pc(),
            acc: self.cpu.get_acc(),
            sr: self.cpu.get_sr(),
            lr: self.cpu.get_lr(),
            gpr: self.cpu.gpr,
            cycles: self.cpu.get_cycles(),
            halted: self.cpu.is_halted(),
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.instance.record_activity();
    }

    /// One instruction. `Ok(false)` means the machine was already halted.
    pub fn step(&mut self) -> Result<bool, EmulatorError> {
        if self.cpu.is_halted() {
            return Ok(false);
        }
        self.cpu.step(&mut self.memory, self.traps.as_mut())?;
        self.instance.record_cycle();
        self.instance.record_instruction();
        self.instance.record_activity();
        Ok(true)
    }

    pub fn execute_steps(&mut self, steps: u32) -> ExecutionResult {
        let mut executed = 0;
        let mut fault = None;

        for _ in 0..steps {
            match self.step() {
                Ok(true) => executed += 1,
                Ok(false) => break,
                Err(err) => {
                    fault = Some(err.to_string());
                    break;
                }
            }
        }

        ExecutionResult {
            steps_executed: executed,
            halted: self.cpu.is_halted(),
            fault,
            final_state: self.get_state(),
        }
    }

    pub fn load_program(&mut self, address: u64, data: &[u8]) -> Result<(), EmulatorError> {
        for (i, &byte) in data.iter().enumerate() {
            self.memory.write(address.wrapping_add(i as u64), byte)?;
        }
        Ok(())
    }

    pub fn apply_template(&mut self, template: &InstanceTemplate) -> Result<(), EmulatorError> {
        self.memory.load_image(&template.boot_image);
        for (&address, &value) in &template.initial_memory {
            self.memory.write(address, value)?;
        }
        self.cpu.set_pc(template.start_pc);
        Ok(())
    }

    pub fn read_memory(&self, address: u64, length: u64) -> Result<Vec<u8>, EmulatorError> {
        (0..length)
            .map(|i| self.memory.read(address.wrapping_add(i)))
            .collect()
    }

    pub fn write_memory(&mut self, address: u64, value: u8) -> Result<(), EmulatorError> {
        self.memory.write(address, value)
    }

    pub fn dump(&self) -> String {
        self.cpu.dump(&self.memory)
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

type EmulatorMap = Arc<Mutex<HashMap<String, Emulator>>>;
type TemplateMap = Arc<Mutex<HashMap<String, InstanceTemplate>>>;

pub async fn run_server() {
    // Initialize Prometheus metrics
    init_metrics();

    // Initialize stores
    let emulators: EmulatorMap = Arc::new(Mutex::new(HashMap::new()));
    let users: UserStore = Arc::new(Mutex::new(HashMap::new()));
    let snapshots: SnapshotStore = Arc::new(Mutex::new(HashMap::new()));
    let templates: TemplateMap = Arc::new(Mutex::new(HashMap::new()));

    // Initialize default users and templates
    init_default_users(users.clone());
    init_default_templates(templates.clone());

    println!("=== Oort Cloud Computing Platform ===");
    println!("Multi-instance Oort emulation service starting...");

    // CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"]);

    // Create new emulator instance
    let create_emulator = warp::path("emulator")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_emulators(emulators.clone()))
        .and(with_templates(templates.clone()))
        .and_then(create_emulator_handler);

    // Get emulator state
    let get_state = warp::path!("emulator" / String)
        .and(warp::get())
        .and(with_emulators(emulators.clone()))
        .and_then(get_state_handler);

    // Reset emulator
    let reset_emulator = warp::path!("emulator" / String / "reset")
        .and(warp::post())
        .and(with_emulators(emulators.clone()))
        .and_then(reset_handler);

    // Step execution
    let step_emulator = warp::path!("emulator" / String / "step")
        .and(warp::post())
        .and(with_emulators(emulators.clone()))
        .and_then(step_handler);

    // Execute multiple steps
    let execute_steps = warp::path!("emulator" / String / "execute")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_emulators(emulators.clone()))
        .and_then(execute_handler);

    // Load program
    let load_program = warp::path!("emulator" / String / "program")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_emulators(emulators.clone()))
        .and_then(load_program_handler);

    // Read memory
    let read_memory = warp::path!("emulator" / String / "memory")
        .and(warp::get())
        .and(warp::query::<MemoryRead>())
        .and(with_emulators(emulators.clone()))
        .and_then(read_memory_handler);

    // Write memory
    let write_memory = warp::path!("emulator" / String / "memory")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_emulators(emulators.clone()))
        .and_then(write_memory_handler);

    // Diagnostic state dump
    let dump_state = warp::path!("emulator" / String / "dump")
        .and(warp::get())
        .and(with_emulators(emulators.clone()))
        .and_then(dump_handler);

    // List emulators
    let list_emulators = warp::path("emulators")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_emulators(emulators.clone()))
        .and_then(list_emulators_handler);

    // Delete emulator
    let delete_emulator = warp::path!("emulator" / String)
        .and(warp::delete())
        .and(with_permission(users.clone(), Permission::DeleteEmulator))
        .and(with_emulators(emulators.clone()))
        .and_then(delete_emulator_handler);

    // Login
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_users(users.clone()))
        .and_then(login_handler);

    // Create snapshot
    let create_snapshot = warp::path!("emulator" / String / "snapshot")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_permission(users.clone(), Permission::ManageSnapshots))
        .and(with_emulators(emulators.clone()))
        .and(with_snapshots(snapshots.clone()))
        .and_then(create_snapshot_handler);

    // List snapshots for an emulator
    let list_snapshots = warp::path!("emulator" / String / "snapshots")
        .and(warp::get())
        .and(with_snapshots(snapshots.clone()))
        .and_then(list_snapshots_handler);

    // Restore snapshot
    let restore_snapshot = warp::path!("emulator" / String / "restore")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_permission(users.clone(), Permission::ManageSnapshots))
        .and(with_emulators(emulators.clone()))
        .and(with_snapshots(snapshots.clone()))
        .and_then(restore_snapshot_handler);

    // Metrics endpoint
    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(metrics_handler);

    let routes = create_emulator
        .or(get_state)
        .or(reset_emulator)
        .or(step_emulator)
        .or(execute_steps)
        .or(load_program)
        .or(read_memory)
        .or(write_memory)
        .or(dump_state)
        .or(list_emulators)
        .or(delete_emulator)
        .or(login)
        .or(create_snapshot)
        .or(list_snapshots)
        .or(restore_snapshot)
        .or(metrics)
        .with(cors);

    println!("Oort Emulator Server starting on http://localhost:3030");
    println!("API Documentation:");
    println!("  POST   /emulator                - Create new emulator instance");
    println!("  GET    /emulator/:id            - Get emulator state");
    println!("  POST   /emulator/:id/reset      - Reset emulator");
    println!("  POST   /emulator/:id/step       - Execute single step");
    println!("  POST   /emulator/:id/execute    - Execute multiple steps");
    println!("  POST   /emulator/:id/program    - Load program");
    println!("  GET    /emulator/:id/memory     - Read memory");
    println!("  POST   /emulator/:id/memory     - Write memory");
    println!("  GET    /emulator/:id/dump       - Human-readable state dump");
    println!("  GET    /emulators               - List all emulator instances");
    println!("  DELETE /emulator/:id            - Delete emulator instance");
    println!("  POST   /auth/login              - Log in, returns a JWT");
    println!("  POST   /emulator/:id/snapshot   - Create snapshot");
    println!("  GET    /emulator/:id/snapshots  - List snapshots");
    println!("  POST   /emulator/:id/restore    - Restore snapshot");
    println!("  GET    /metrics                 - Prometheus metrics endpoint");

    warp::serve(routes)
        .run(([127, 0, 0, 1], 3030))
        .await;
}

fn with_emulators(emulators: EmulatorMap) -> impl Filter<Extract = (EmulatorMap,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || emulators.clone())
}

fn with_templates(templates: TemplateMap) -> impl Filter<Extract = (TemplateMap,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || templates.clone())
}

fn with_users(users: UserStore) -> impl Filter<Extract = (UserStore,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || users.clone())
}

fn with_snapshots(snapshots: SnapshotStore) -> impl Filter<Extract = (SnapshotStore,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || snapshots.clone())
}

async fn create_emulator_handler(
    request: CreateInstanceRequest,
    emulators: EmulatorMap,
    templates: TemplateMap,
) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();

    let template = {
        let templates_lock = templates.lock().unwrap();
        request
            .template_id
            .as_ref()
            .and_then(|id| templates_lock.get(id).cloned())
    };
    if request.template_id.is_some() && template.is_none() {
        let response: ApiResponse<EmulatorState> = ApiResponse::error("Template not found".to_string());
        record_api_request("POST", "/emulator", 404, timer.elapsed());
        return Ok(warp::reply::json(&response));
    }

    let emulator_type = request
        .emulator_type
        .clone()
        .or_else(|| template.as_ref().map(|t| t.emulator_type.clone()))
        .unwrap_or_default();

    let mut instance = EmulatorInstance::new(
        "system".to_string(),
        emulator_type,
        request.name.clone(),
        request.template_id.clone(),
        request.tags.clone(),
    );
    if request.auto_start.unwrap_or(false) {
        instance.start();
    }

    let id = instance.id.clone();
    let mut emulator = Emulator::new_with_instance(instance);

    if let Some(template) = &template {
        if let Err(err) = emulator.apply_template(template) {
            let response: ApiResponse<EmulatorState> = ApiResponse::error(err.to_string());
            record_api_request("POST", "/emulator", 400, timer.elapsed());
            return Ok(warp::reply::json(&response));
        }
        record_program_load(&id);
    }

    let state = emulator.get_state();

    {
        let mut emulators_lock = emulators.lock().unwrap();
        emulators_lock.insert(id.clone(), emulator);
        set_active_emulators(emulators_lock.len());
    }

    // Update CPU metrics for the new emulator
    update_cpu_registers(&id, state.pc, state.acc, state.sr, state.lr);

    let response = ApiResponse::success(EmulatorState {
        id,
        cpu: state,
    });

    record_api_request("POST", "/emulator", 200, timer.elapsed());
    Ok(warp::reply::json(&response))
}

async fn get_state_handler(id: String, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let emulators_lock = emulators.lock().unwrap();

    match emulators_lock.get(&id) {
        Some(emulator) => {
            let response = ApiResponse::success(EmulatorState {
                id: id.clone(),
                cpu: emulator.get_state(),
            });
            Ok(warp::reply::json(&response))
        }
        None => {
            let response: ApiResponse<EmulatorState> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn reset_handler(id: String, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let mut emulators_lock = emulators.lock().unwrap();

    match emulators_lock.get_mut(&id) {
        Some(emulator) => {
            emulator.reset();
            record_emulator_reset(&id);
            let response = ApiResponse::success(EmulatorState {
                id: id.clone(),
                cpu: emulator.get_state(),
            });
            Ok(warp::reply::json(&response))
        }
        None => {
            let response: ApiResponse<EmulatorState> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn step_handler(id: String, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let mut emulators_lock = emulators.lock().unwrap();

    let result = match emulators_lock.get_mut(&id) {
        Some(emulator) => match emulator.step() {
            Ok(_) => {
                let state = emulator.get_state();

                // Update CPU metrics
                update_cpu_registers(&id, state.pc, state.acc, state.sr, state.lr);

                let response = ApiResponse::success(EmulatorState {
                    id: id.clone(),
                    cpu: state,
                });
                Ok(warp::reply::json(&response))
            }
            Err(err) => {
                let response: ApiResponse<EmulatorState> = ApiResponse::error(err.to_string());
                Ok(warp::reply::json(&response))
            }
        },
        None => {
            let response: ApiResponse<EmulatorState> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    };

    record_api_request("POST", "/emulator/:id/step", 200, timer.elapsed());
    result
}

async fn execute_handler(id: String, request: ExecuteSteps, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let mut emulators_lock = emulators.lock().unwrap();

    match emulators_lock.get_mut(&id) {
        Some(emulator) => {
            emulator.instance.record_api_call();
            let result = emulator.execute_steps(request.steps);
            update_cpu_registers(
                &id,
                result.final_state.pc,
                result.final_state.acc,
                result.final_state.sr,
                result.final_state.lr,
            );
            let response = ApiResponse::success(result);
            Ok(warp::reply::json(&response))
        }
        None => {
            let response: ApiResponse<ExecutionResult> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn load_program_handler(id: String, request: ProgramLoad, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let mut emulators_lock = emulators.lock().unwrap();

    match emulators_lock.get_mut(&id) {
        Some(emulator) => match emulator.load_program(request.address, &request.data) {
            Ok(()) => {
                record_program_load(&id);
                let response = ApiResponse::success(format!(
                    "Loaded {} bytes at address {:#x}",
                    request.data.len(),
                    request.address
                ));
                Ok(warp::reply::json(&response))
            }
            Err(err) => {
                let response: ApiResponse<String> = ApiResponse::error(err.to_string());
                Ok(warp::reply::json(&response))
            }
        },
        None => {
            let response: ApiResponse<String> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn read_memory_handler(id: String, query: MemoryRead, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let emulators_lock = emulators.lock().unwrap();

    match emulators_lock.get(&id) {
        Some(emulator) => {
            let length = query.length.unwrap_or(1).min(4096);
            match emulator.read_memory(query.address, length) {
                Ok(data) => {
                    record_memory_operation("read", &id);
                    let response = ApiResponse::success(MemoryData {
                        address: query.address,
                        data,
                    });
                    Ok(warp::reply::json(&response))
                }
                Err(err) => {
                    let response: ApiResponse<MemoryData> = ApiResponse::error(err.to_string());
                    Ok(warp::reply::json(&response))
                }
            }
        }
        None => {
            let response: ApiResponse<MemoryData> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn write_memory_handler(id: String, request: MemoryWrite, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let mut emulators_lock = emulators.lock().unwrap();

    match emulators_lock.get_mut(&id) {
        Some(emulator) => match emulator.write_memory(request.address, request.value) {
            Ok(()) => {
                record_memory_operation("write", &id);
                let response = ApiResponse::success(format!(
                    "Wrote {:#04x} to address {:#x}",
                    request.value, request.address
                ));
                Ok(warp::reply::json(&response))
            }
            Err(err) => {
                let response: ApiResponse<String> = ApiResponse::error(err.to_string());
                Ok(warp::reply::json(&response))
            }
        },
        None => {
            let response: ApiResponse<String> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn dump_handler(id: String, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let emulators_lock = emulators.lock().unwrap();

    let body = match emulators_lock.get(&id) {
        Some(emulator) => emulator.dump(),
        None => "Emulator not found\n".to_string(),
    };

    Ok(warp::reply::with_header(
        body,
        "content-type",
        "text/plain; charset=utf-8",
    ))
}

async fn list_emulators_handler(emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let emulators_lock = emulators.lock().unwrap();

    let emulator_list: Vec<EmulatorState> = emulators_lock
        .iter()
        .map(|(id, emulator)| EmulatorState {
            id: id.clone(),
            cpu: emulator.get_state(),
        })
        .collect();

    let response = ApiResponse::success(emulator_list);
    Ok(warp::reply::json(&response))
}

async fn delete_emulator_handler(id: String, _user: User, emulators: EmulatorMap) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let mut emulators_lock = emulators.lock().unwrap();

    let result = match emulators_lock.remove(&id) {
        Some(_) => {
            set_active_emulators(emulators_lock.len());
            let response = ApiResponse::success(format!("Emulator {} deleted", id));
            Ok(warp::reply::json(&response))
        }
        None => {
            let response: ApiResponse<String> = ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    };

    record_api_request("DELETE", "/emulator/:id", 200, timer.elapsed());
    result
}

async fn login_handler(request: LoginRequest, users: UserStore) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();

    let result = match verify_login(&users, &request.username, &request.password) {
        Ok(user) => match create_jwt_token(&user) {
            Ok(token) => {
                let response = ApiResponse::success(AuthResponse {
                    token,
                    user: user.info(),
                });
                Ok(warp::reply::json(&response))
            }
            Err(err) => {
                let response: ApiResponse<AuthResponse> =
                    ApiResponse::error(format!("Failed to issue token: {}", err));
                Ok(warp::reply::json(&response))
            }
        },
        Err(err) => {
            let response: ApiResponse<AuthResponse> = ApiResponse::error(format!("{:?}", err));
            Ok(warp::reply::json(&response))
        }
    };

    record_api_request("POST", "/auth/login", 200, timer.elapsed());
    result
}

async fn create_snapshot_handler(
    id: String,
    request: CreateSnapshotRequest,
    user: User,
    emulators: EmulatorMap,
    snapshots: SnapshotStore,
) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshot = {
        let emulators_lock = emulators.lock().unwrap();
        match emulators_lock.get(&id) {
            Some(emulator) => EmulatorSnapshot::create_from_emulator(
                request.name,
                request.description.unwrap_or_default(),
                id.clone(),
                user.id.clone(),
                &emulator.cpu,
                &emulator.memory,
                emulator.instance.emulator_type.to_string().to_string(),
                emulator.instance.template_id.clone(),
                CheckpointReason::Manual,
                emulator.instance.get_runtime_seconds() * 1000,
                request.tags.unwrap_or_default(),
            ),
            None => {
                let response: ApiResponse<SnapshotListResponse> =
                    ApiResponse::error("Emulator not found".to_string());
                return Ok(warp::reply::json(&response));
            }
        }
    };

    let summary = snapshot.get_summary();
    snapshots
        .lock()
        .unwrap()
        .insert(snapshot.id.clone(), snapshot);

    let response = ApiResponse::success(summary);
    Ok(warp::reply::json(&response))
}

async fn list_snapshots_handler(id: String, snapshots: SnapshotStore) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshots_lock = snapshots.lock().unwrap();

    let summaries: Vec<_> = snapshots_lock
        .values()
        .filter(|snapshot| snapshot.emulator_id == id)
        .map(|snapshot| snapshot.get_summary())
        .collect();
    let total_size_bytes = summaries.iter().map(|summary| summary.size_bytes).sum();

    let response = ApiResponse::success(SnapshotListResponse {
        total_count: summaries.len(),
        total_size_bytes,
        snapshots: summaries,
    });
    Ok(warp::reply::json(&response))
}

async fn restore_snapshot_handler(
    id: String,
    request: RestoreSnapshotRequest,
    user: User,
    emulators: EmulatorMap,
    snapshots: SnapshotStore,
) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshot = {
        let snapshots_lock = snapshots.lock().unwrap();
        snapshots_lock.get(&request.snapshot_id).cloned()
    };
    let snapshot = match snapshot {
        Some(snapshot) => snapshot,
        None => {
            let response: ApiResponse<EmulatorState> =
                ApiResponse::error("Snapshot not found".to_string());
            return Ok(warp::reply::json(&response));
        }
    };

    if !snapshot.can_user_access(&user.id, user.has_permission(&Permission::Admin)) {
        let response: ApiResponse<EmulatorState> = ApiResponse::error("Access denied".to_string());
        return Ok(warp::reply::json(&response));
    }

    let mut emulators_lock = emulators.lock().unwrap();
    match emulators_lock.get_mut(&id) {
        Some(emulator) => {
            let running = !emulator.cpu.is_halted() && emulator.cpu.get_cycles() > 0;
            if running && !request.force.unwrap_or(false) {
                let response: ApiResponse<EmulatorState> = ApiResponse::error(
                    "Emulator is mid-run; pass force to overwrite its state".to_string(),
                );
                return Ok(warp::reply::json(&response));
            }

            match snapshot.restore_to_emulator(&mut emulator.cpu, &mut emulator.memory) {
                Ok(()) => {
                    let response = ApiResponse::success(EmulatorState {
                        id: id.clone(),
                        cpu: emulator.get_state(),
                    });
                    Ok(warp::reply::json(&response))
                }
                Err(err) => {
                    let response: ApiResponse<EmulatorState> = ApiResponse::error(err);
                    Ok(warp::reply::json(&response))
                }
            }
        }
        None => {
            let response: ApiResponse<EmulatorState> =
                ApiResponse::error("Emulator not found".to_string());
            Ok(warp::reply::json(&response))
        }
    }
}

async fn metrics_handler() -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => {
            record_api_request("GET", "/metrics", 200, timer.elapsed());
            Ok(warp::reply::with_header(
                metrics_text,
                "content-type",
                "text/plain; version=0.0.4",
            ))
        }
        Err(_) => {
            record_api_request("GET", "/metrics", 500, timer.elapsed());
            Ok(warp::reply::with_header(
                "Error encoding metrics".to_string(),
                "content-type",
                "text/plain",
            ))
        }
    }
}

fn init_default_templates(templates: TemplateMap) {
    let mut templates_lock = templates.lock().unwrap();
    let default_templates = InstanceTemplate::create_basic_templates();

    for template in default_templates {
        templates_lock.insert(template.id.clone(), template);
    }

    println!("Initialized {} default instance templates", templates_lock.len());
}
