use oort_emulator::cpu::{HaltOnTrap, CPU};
use oort_emulator::instance_types::{EmulatorInstance, InstanceTemplate, SELFTEST_IMAGE};
use oort_emulator::memory::Memory;
use oort_emulator::server::Emulator;

fn load(memory: &mut Memory, program: &[u8]) {
    for (i, &byte) in program.iter().enumerate() {
        memory.write(i as u64, byte).unwrap();
    }
}

#[test]
fn test_countdown_sum() {
    let mut cpu = CPU::new();
    let mut memory = Memory::new(256);

    // Sum 5+4+3+2+1 into r2 with a counter in r1
    let program = [
        0xF0, 0x05, 0x00, // addi $000x, 5   ; acc = 5
        0x31,             // mt r1           ; counter
        0x22,             // mf r2           ; loop: acc = total
        0x71,             // add r1
        0x32,             // mt r2
        0x21,             // mf r1
        0xF3, 0xFF, 0xFF, // addi $111x, -1
        0x31,             // mt r1
        0x82, 0xF5, 0xFF, // jump $p, -11    ; while counter is positive
        0x0F,             // halt
    ];
    load(&mut memory, &program);

    cpu.run(&mut memory, &mut HaltOnTrap).unwrap();

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_gpr(2), 15);
    assert_eq!(cpu.get_gpr(1), 0);
    assert_eq!(cpu.get_acc(), 0);
}

#[test]
fn test_call_and_return() {
    let mut cpu = CPU::new();
    let mut memory = Memory::new(256);

    let program = [
        0x91, 0x03, 0x00, // call $z, +3     ; acc is zero, so taken
        0x0F,             // halt            ; return lands here
        0x00, 0x00,       // (never executed)
        0xF0, 0x2A, 0x00, // addi $000x, 42  ; subroutine body
        0x0A,             // ret
    ];
    load(&mut memory, &program);

    cpu.run(&mut memory, &mut HaltOnTrap).unwrap();

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_acc(), 42);
    assert_eq!(cpu.get_lr(), 3);
    assert_eq!(cpu.get_pc(), 4);
}

#[test]
fn test_store_then_load_through_rotating_words() {
    let mut cpu = CPU::new();
    let mut memory = Memory::new(1024);

    // Build 0xFFFF694200000000, store it at an unaligned address, clear the
    // accumulator, and load it back
    let program = [
        0xF9, 0x42, 0x69, // addi $1x00, 0x6942
        0xB0, 0x03, 0x01, // st r0, 0x103
        0x10,             // test 0
        0xA0, 0x03, 0x01, // ld r0, 0x103
        0x0F,             // halt
    ];
    load(&mut memory, &program);

    cpu.run(&mut memory, &mut HaltOnTrap).unwrap();

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_acc(), 0xFFFF_6942_0000_0000);
    assert_eq!(memory.read_word(0x103).unwrap(), 0xFFFF_6942_0000_0000);
    // The write stayed inside the aligned block at 0x100
    assert_eq!(memory.read(0xFF).unwrap(), 0);
    assert_eq!(memory.read(0x108).unwrap(), 0);
}

#[test]
fn test_selftest_program_matches_reference_trace() {
    let mut cpu = CPU::new();
    let mut memory = Memory::new(1024);
    memory.load_image(&SELFTEST_IMAGE);

    cpu.run(&mut memory, &mut HaltOnTrap).unwrap();

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_pc(), 44);
    assert_eq!(cpu.get_cycles(), 28687);

    // Mask written by the first test instruction
    assert_eq!(cpu.get_gpr(5), u64::MAX);

    // The 0x1000-iteration loop accumulates 0x47 per pass
    assert_eq!(cpu.get_gpr(8), 1);
    assert_eq!(cpu.get_gpr(9), 0x47000);

    // Lane-by-lane constant left in the accumulator and stored at 0x207
    assert_eq!(cpu.get_acc(), 0xEFCDAB8967452301);
    assert_eq!(memory.read_word(0x207).unwrap(), 0xEFCDAB8967452301);

    // Loop result stored word-aligned at 0x100
    assert_eq!(
        &memory.bytes()[0x100..0x108],
        &[0x00, 0x70, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    // The unaligned store rotated the constant's bytes within its block
    assert_eq!(
        &memory.bytes()[0x200..0x208],
        &[0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x01]
    );
}

#[test]
fn test_dump_is_deterministic() {
    let mut first_cpu = CPU::new();
    let mut first_memory = Memory::new(1024);
    first_memory.load_image(&SELFTEST_IMAGE);
    first_cpu.run(&mut first_memory, &mut HaltOnTrap).unwrap();

    let mut second_cpu = CPU::new();
    let mut second_memory = Memory::new(1024);
    second_memory.load_image(&SELFTEST_IMAGE);
    second_cpu.run(&mut second_memory, &mut HaltOnTrap).unwrap();

    assert_eq!(first_cpu.dump(&first_memory), second_cpu.dump(&second_memory));
}

#[test]
fn test_emulator_instance_runs_selftest_template() {
    let templates = InstanceTemplate::create_basic_templates();
    let template = templates
        .iter()
        .find(|template| template.id == "selftest")
        .unwrap();

    let instance = EmulatorInstance::new(
        "tester".to_string(),
        template.emulator_type.clone(),
        None,
        Some(template.id.clone()),
        None,
    );
    let mut emulator = Emulator::new_with_instance(instance);
    emulator.apply_template(template).unwrap();

    let result = emulator.execute_steps(100_000);

    assert!(result.halted);
    assert!(result.fault.is_none());
    assert_eq!(result.steps_executed, 28687);
    assert_eq!(result.final_state.acc, 0xEFCDAB8967452301);
    assert_eq!(result.final_state.gpr[9], 0x47000);
    assert_eq!(emulator.instance.usage_stats.total_instructions, 28687);
}

#[test]
fn test_emulator_reports_fault_and_stops() {
    let mut emulator = Emulator::new();

    // ld r0, -8 wraps the address to the top of the 64-bit space, where no
    // complete block exists
    emulator.load_program(0, &[0xA0, 0xF8, 0xFF]).unwrap();
    let result = emulator.execute_steps(10);

    assert_eq!(result.steps_executed, 0);
    assert!(!result.halted);
    let fault = result.fault.unwrap();
    assert!(fault.contains("out of bounds"), "unexpected fault: {}", fault);
}

#[test]
fn test_emulator_memory_endpoints_round_trip() {
    let mut emulator = Emulator::new();

    emulator.load_program(0x40, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    assert_eq!(
        emulator.read_memory(0x40, 4).unwrap(),
        vec![0xDE, 0xAD, 0xBE, 0xEF]
    );

    emulator.write_memory(0x40, 0x00).unwrap();
    assert_eq!(emulator.read_memory(0x40, 1).unwrap(), vec![0x00]);

    // Reads past the end of memory are a reported fault, not a panic
    assert!(emulator.read_memory(emulator.memory.size(), 1).is_err());
}
