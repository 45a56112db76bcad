use super::{Type, ValueType};
use crate::codegen::Label;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value_type: ValueType,
    /// First slot on the local stack, or in the global area
    pub index: u32,
    pub is_global: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Type,
    pub returns: Type,
    pub entry: Label,
    pub line: usize,
}

/// An enclosing loop that `break`/`continue` may target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cycle {
    pub begin: Label,
    pub end: Label,
    /// Local stack height when the loop body starts
    pub clear_base: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionFrame {
    pub returns: Type,
    /// Local stack height before the arguments
    pub base: u32,
    /// Loops opened before this function; they are not visible inside it
    pub cycle_base: usize,
}

#[derive(Debug, Clone)]
enum Entry {
    Block,
    Function,
    Variable(Variable),
}

/// Scope stack plus the function table.
///
/// Local lookups stop at the innermost function boundary; globals stay
/// visible through it.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: Vec<Entry>,
    functions: FxHashMap<(String, Type), Function>,
    frames: Vec<FunctionFrame>,
    cycles: Vec<Cycle>,
    local_top: u32,
    global_top: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_top(&self) -> u32 {
        self.local_top
    }

    pub fn global_top(&self) -> u32 {
        self.global_top
    }

    pub fn push_scope(&mut self) {
        self.entries.push(Entry::Block);
    }

    /// Close the innermost block and return how many local slots it held
    pub fn pop_scope(&mut self) -> u32 {
        self.pop_until_marker()
    }

    pub fn enter_function(&mut self, returns: Type) {
        self.entries.push(Entry::Function);
        self.frames.push(FunctionFrame {
            returns,
            base: self.local_top,
            cycle_base: self.cycles.len(),
        });
    }

    /// Close the function scope and return how many argument slots it held
    pub fn exit_function(&mut self) -> u32 {
        let cleared = self.pop_until_marker();
        self.frames.pop();
        cleared
    }

    fn pop_until_marker(&mut self) -> u32 {
        let mut cleared = 0;
        while let Some(entry) = self.entries.pop() {
            match entry {
                Entry::Variable(var) => {
                    if !var.is_global {
                        cleared += var.value_type.slots();
                    }
                }
                Entry::Block | Entry::Function => break,
            }
        }
        self.local_top -= cleared;
        cleared
    }

    pub fn add_variable(&mut self, name: &str, value_type: ValueType, is_global: bool) -> Variable {
        let index = if is_global {
            let index = self.global_top;
            self.global_top += value_type.slots();
            index
        } else {
            let index = self.local_top;
            self.local_top += value_type.slots();
            index
        };
        let var = Variable {
            name: name.to_string(),
            value_type,
            index,
            is_global,
        };
        self.entries.push(Entry::Variable(var.clone()));
        var
    }

    /// Innermost visible variable with this name
    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        let mut crossed_function = false;
        for entry in self.entries.iter().rev() {
            match entry {
                Entry::Function => crossed_function = true,
                Entry::Block => {}
                Entry::Variable(var) if var.name == name => {
                    if var.is_global || !crossed_function {
                        return Some(var);
                    }
                }
                Entry::Variable(_) => {}
            }
        }
        None
    }

    /// Distance from the local stack top to the start of `var`
    pub fn distance(&self, var: &Variable) -> u32 {
        self.local_top - var.index
    }

    /// Register a signature; returns the existing entry on a clash
    pub fn declare_function(&mut self, function: Function) -> Result<(), &Function> {
        let key = (function.name.clone(), function.args.clone());
        if self.functions.contains_key(&key) {
            return Err(&self.functions[&key]);
        }
        self.functions.insert(key, function);
        Ok(())
    }

    pub fn find_function(&self, name: &str, args: &Type) -> Option<&Function> {
        self.functions.get(&(name.to_string(), args.clone()))
    }

    pub fn has_function_named(&self, name: &str) -> bool {
        self.functions.keys().any(|(n, _)| n == name)
    }

    pub fn current_frame(&self) -> Option<&FunctionFrame> {
        self.frames.last()
    }

    pub fn push_cycle(&mut self, begin: Label, end: Label) {
        self.cycles.push(Cycle {
            begin,
            end,
            clear_base: self.local_top,
        });
    }

    pub fn pop_cycle(&mut self) {
        self.cycles.pop();
    }

    /// The loop `level` steps out from the innermost one, if it is inside
    /// the current function
    pub fn cycle(&self, level: usize) -> Option<&Cycle> {
        let base = self.frames.last().map_or(0, |frame| frame.cycle_base);
        let visible = &self.cycles[base..];
        if level < visible.len() {
            visible.get(visible.len() - 1 - level)
        } else {
            None
        }
    }
}
