//! Pretty-printing for IR
//!
//! Provides human-readable output for debugging IR structures.

use super::block::BasicBlock;
use super::function::IrFunction;
use super::instr::IrInstr;
use super::module::IrModule;
use super::value::{IrValue, Register};
use kiln_syntax::InitState;
use std::fmt::Write;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for IrModule {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        writeln!(output, "; module {}", self.name).unwrap();
        writeln!(output).unwrap();

        for func in &self.functions {
            output.push_str(&func.pretty_print());
            writeln!(output).unwrap();
        }

        output
    }
}

impl PrettyPrint for IrFunction {
    fn pretty_print(&self) -> String {
        let mut output = String::new();

        // Function signature
        let mut params: Vec<String> = Vec::new();
        if let Some(this) = &self.this_param {
            params.push(format!("this {}", this));
        }
        params.extend(self.params.iter().map(|p| format!("{}", p)));
        if let Some(rest) = &self.rest_param {
            params.push(format!("...{}", rest));
        }
        writeln!(
            output,
            "fn {} {}({}) [{}] {{",
            self.id,
            self.name,
            params.join(", "),
            self.kind.as_str()
        )
        .unwrap();

        if !self.stack_slots.is_empty() {
            let slots: Vec<String> = self
                .stack_slots
                .iter()
                .enumerate()
                .map(|(i, s)| format!("s{} {}", i, s.name))
                .collect();
            writeln!(output, "  ; stack: {}", slots.join(", ")).unwrap();
        }

        for (i, layout) in self.env_layouts.iter().enumerate() {
            let slots: Vec<String> = layout
                .slots
                .iter()
                .map(|s| match s.init {
                    InitState::Uninitialized => format!("{}?", s.name),
                    InitState::Initialized => s.name.clone(),
                })
                .collect();
            writeln!(output, "  ; env{}: [{}]", i, slots.join(", ")).unwrap();
        }

        for block in &self.blocks {
            output.push_str(&block.pretty_print_indented(2));
        }

        writeln!(output, "}}").unwrap();
        output
    }
}

impl BasicBlock {
    fn pretty_print_indented(&self, indent: usize) -> String {
        let mut output = String::new();
        let prefix = " ".repeat(indent);

        // Block header
        write!(output, "{}{}:", prefix, self.id).unwrap();
        if let Some(label) = &self.label {
            write!(output, " ; {}", label).unwrap();
        }
        if !self.predecessors.is_empty() {
            let preds: Vec<String> = self.predecessors.iter().map(|p| p.to_string()).collect();
            write!(output, " preds=[{}]", preds.join(", ")).unwrap();
        }
        if let Some(handler) = self.handler {
            write!(output, " handler={}", handler).unwrap();
        }
        writeln!(output).unwrap();

        for instr in &self.instructions {
            writeln!(output, "{}  {}", prefix, format_instr(instr)).unwrap();
        }

        match &self.terminator {
            Some(term) => writeln!(output, "{}  {}", prefix, term).unwrap(),
            None => writeln!(output, "{}  <no terminator>", prefix).unwrap(),
        }

        output
    }
}

fn regs(list: &[Register]) -> String {
    list.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

fn opt_reg(reg: &Option<Register>) -> String {
    match reg {
        Some(r) => r.to_string(),
        None => "none".to_string(),
    }
}

/// Render a single instruction
pub fn format_instr(instr: &IrInstr) -> String {
    match instr {
        IrInstr::Assign { dest, value } => format!("{} = {}", dest, format_value(value)),
        IrInstr::Phi { dest, sources } => {
            let srcs: Vec<String> = sources
                .iter()
                .map(|(block, reg)| format!("{}: {}", block, reg))
                .collect();
            format!("{} = phi [{}]", dest, srcs.join(", "))
        }
        IrInstr::BinaryOp {
            dest,
            op,
            left,
            right,
        } => format!("{} = {} {}, {}", dest, op, left, right),
        IrInstr::UnaryOp { dest, op, operand } => format!("{} = {} {}", dest, op, operand),
        IrInstr::LoadStack { dest, slot } => format!("{} = load_stack {}", dest, slot),
        IrInstr::StoreStack { slot, value } => format!("store_stack {}, {}", slot, value),
        IrInstr::LoadGlobal { dest, name } => format!("{} = load_global {}", dest, name),
        IrInstr::StoreGlobal { name, value } => format!("store_global {}, {}", name, value),
        IrInstr::CreateEnvironment {
            dest,
            layout,
            parent,
        } => format!("{} = create_env {} parent={}", dest, layout, opt_reg(parent)),
        IrInstr::CopyEnvironment { dest, env } => format!("{} = copy_env {}", dest, env),
        IrInstr::LoadEnvSlot {
            dest,
            env,
            hops,
            slot,
        } => format!("{} = load_env {}[{}:{}]", dest, env, hops, slot),
        IrInstr::StoreEnvSlot {
            env,
            hops,
            slot,
            value,
        } => format!("store_env {}[{}:{}], {}", env, hops, slot, value),
        IrInstr::LoadClosureEnv { dest } => format!("{} = closure_env", dest),
        IrInstr::LoadParentEnv { dest, env } => format!("{} = parent_env {}", dest, env),
        IrInstr::GetEnvironment { dest, env, hops } => {
            format!("{} = get_env {} hops={}", dest, env, hops)
        }
        IrInstr::CreateClosure { dest, func, env } => {
            format!("{} = closure {} env={}", dest, func, opt_reg(env))
        }
        IrInstr::Call {
            dest,
            callee,
            receiver,
            args,
        } => match receiver {
            Some(recv) => format!("{} = call {}.{}({})", dest, recv, callee, regs(args)),
            None => format!("{} = call {}({})", dest, callee, regs(args)),
        },
        IrInstr::Construct { dest, callee, args } => {
            format!("{} = new {}({})", dest, callee, regs(args))
        }
        IrInstr::CreateClass {
            dest,
            name,
            constructor,
            methods,
        } => {
            let methods: Vec<String> = methods
                .iter()
                .map(|(name, reg)| format!("{}: {}", name, reg))
                .collect();
            format!(
                "{} = class {} ctor={} {{{}}}",
                dest,
                name,
                opt_reg(constructor),
                methods.join(", ")
            )
        }
        IrInstr::NewObject { dest } => format!("{} = new_object", dest),
        IrInstr::NewArray { dest, elements } => format!("{} = new_array [{}]", dest, regs(elements)),
        IrInstr::ArrayPush { array, value } => format!("array_push {}, {}", array, value),
        IrInstr::ArraySpread { array, iterable } => format!("array_spread {}, {}", array, iterable),
        IrInstr::LoadField {
            dest,
            object,
            field,
        } => format!("{} = {}.{}", dest, object, field),
        IrInstr::StoreField {
            object,
            field,
            value,
        } => format!("{}.{} = {}", object, field, value),
        IrInstr::LoadElement { dest, object, key } => format!("{} = {}[{}]", dest, object, key),
        IrInstr::StoreElement { object, key, value } => format!("{}[{}] = {}", object, key, value),
        IrInstr::CopyDataProperties {
            target,
            source,
            excluded,
        } => format!("copy_props {}, {} except [{}]", target, source, regs(excluded)),
        IrInstr::OwnKeys { dest, object } => format!("{} = own_keys {}", dest, object),
        IrInstr::GetIterator { dest, iterable } => format!("{} = get_iterator {}", dest, iterable),
        IrInstr::IteratorClose {
            iterator,
            suppress_errors,
        } => {
            if *suppress_errors {
                format!("iterator_close {} suppress", iterator)
            } else {
                format!("iterator_close {}", iterator)
            }
        }
        IrInstr::ThrowIfNotObject { value, message } => {
            format!("throw_if_not_object {} \"{}\"", value, message.escape_default())
        }
        IrInstr::ThrowIfEmpty { dest, value, name } => {
            format!("{} = throw_if_empty {} '{}'", dest, value, name)
        }
        IrInstr::Catch { dest } => format!("{} = catch", dest),
        IrInstr::CreateGenerator { dest, machine, env } => {
            format!("{} = create_generator {} env={}", dest, machine, env)
        }
        IrInstr::ResumeGenerator {
            dest,
            generator,
            action,
            value,
        } => format!("{} = resume {} {}, {}", dest, generator, action, value),
        IrInstr::LoadGeneratorState { dest, generator } => {
            format!("{} = generator_state {}", dest, generator)
        }
        IrInstr::SetGeneratorState { generator, state } => {
            format!("set_generator_state {}, {}", generator, state)
        }
        IrInstr::CreateIterResult { dest, value, done } => {
            format!("{} = iter_result {}, done={}", dest, value, done)
        }
        IrInstr::RunAsync { dest, generator } => format!("{} = run_async {}", dest, generator),
        IrInstr::DirectEval { dest, source, env } => {
            format!("{} = direct_eval {} env={}", dest, source, opt_reg(env))
        }
        IrInstr::LoadExternal {
            dest,
            unit,
            function,
        } => format!("{} = load_external {}::{}", dest, unit, function),
    }
}

fn format_value(value: &IrValue) -> String {
    match value {
        IrValue::Register(reg) => format!("{}", reg),
        IrValue::Constant(c) => format!("const {}", c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::{BasicBlockId, Terminator};
    use crate::ir::function::{EnvLayout, EnvSlot, IrFunctionKind};
    use crate::ir::instr::{BinaryOp, FunctionId};
    use crate::ir::value::{IrConstant, RegisterId};
    use kiln_syntax::{BindingId, TypeId};

    fn reg(id: u32, ty: TypeId) -> Register {
        Register::new(RegisterId::new(id), ty)
    }

    #[test]
    fn test_pretty_print_function() {
        let mut func = IrFunction::new(FunctionId(1), "add", IrFunctionKind::Normal);
        func.params = vec![reg(0, TypeId::NUMBER), reg(1, TypeId::NUMBER)];
        let mut block = BasicBlock::with_label(BasicBlockId(0), "entry");
        block.add_instr(IrInstr::BinaryOp {
            dest: reg(2, TypeId::NUMBER),
            op: BinaryOp::NumberAdd,
            left: reg(0, TypeId::NUMBER),
            right: reg(1, TypeId::NUMBER),
        });
        block.set_terminator(Terminator::Return(Some(reg(2, TypeId::NUMBER))));
        func.add_block(block);

        let output = func.pretty_print();
        assert!(output.contains("fn fn1 add(r0:1, r1:1) [normal] {"));
        assert!(output.contains("bb0: ; entry"));
        assert!(output.contains("r2:1 = number_add r0:1, r1:1"));
        assert!(output.contains("return r2:1"));
    }

    #[test]
    fn test_pretty_print_layouts_and_missing_terminator() {
        let mut func = IrFunction::new(FunctionId(0), "main", IrFunctionKind::ModuleInit);
        func.add_env_layout(EnvLayout {
            slots: vec![EnvSlot {
                name: "x".into(),
                binding: Some(BindingId(0)),
                init: InitState::Uninitialized,
            }],
        });
        let mut block = BasicBlock::new(BasicBlockId(0));
        block.add_instr(IrInstr::Assign {
            dest: reg(0, TypeId::UNDEFINED),
            value: IrValue::Constant(IrConstant::Empty),
        });
        func.add_block(block);

        let output = func.pretty_print();
        assert!(output.contains("; env0: [x?]"));
        assert!(output.contains("r0:5 = const <empty>"));
        assert!(output.contains("<no terminator>"));
    }
}
