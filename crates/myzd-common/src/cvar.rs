// cvar.rs — dynamic variable tracking
//
// Console variables carry every piece of tunable configuration the game
// state engine consumes: difficulty, autosave policy, world physics
// defaults. Storage is insertion ordered with a hash index for O(1)
// lookup by name.

use crate::console::set_developer;

use std::collections::HashMap;
use std::fmt::Write as _;

/// Saved to the configuration file by write_variables.
pub const CVAR_ARCHIVE: i32 = 1;
/// Created by code, never written out.
pub const CVAR_INTERNAL: i32 = 2;

/// A console variable.
#[derive(Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

/// The full cvar system context.
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self {
            cvar_vars: Vec::new(),
            cvar_index: HashMap::new(),
        }
    }

    /// Find a cvar by name.
    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Find a cvar by name (mutable).
    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Cvar> {
        if let Some(&idx) = self.cvar_index.get(name) {
            Some(&mut self.cvar_vars[idx])
        } else {
            None
        }
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        match self.find_var(name) {
            Some(var) => var.value,
            None => 0.0,
        }
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        match self.find_var(name) {
            Some(var) => &var.string,
            None => "",
        }
    }

    /// Register a cvar if it doesn't exist yet, returning its current
    /// string value. Flags are OR'd into an existing variable.
    pub fn get(&mut self, name: &str, default_value: &str, flags: i32) -> String {
        if let Some(var) = self.find_var_mut(name) {
            var.flags |= flags;
            return var.string.clone();
        }

        let var = Cvar {
            name: name.to_string(),
            string: default_value.to_string(),
            flags,
            modified: true,
            value: default_value.parse().unwrap_or(0.0),
        };
        self.cvar_index.insert(name.to_string(), self.cvar_vars.len());
        self.cvar_vars.push(var);
        self.post_set(name);
        default_value.to_string()
    }

    /// Set a cvar's value, creating it if necessary.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.find_var_mut(name) {
            Some(var) => {
                if var.string == value {
                    return;
                }
                var.string = value.to_string();
                var.value = value.parse().unwrap_or(0.0);
                var.modified = true;
            }
            None => {
                self.get(name, value, 0);
                return;
            }
        }
        self.post_set(name);
    }

    /// Set a cvar from a float.
    pub fn set_value(&mut self, name: &str, value: f32) {
        let s = if value == value.trunc() {
            format!("{}", value as i64)
        } else {
            format!("{}", value)
        };
        self.set(name, &s);
    }

    // Side effects of assignment that other modules observe.
    fn post_set(&mut self, name: &str) {
        if name == "developer" {
            set_developer(self.variable_value("developer") != 0.0);
        }
    }

    /// Appends "set <name> <value>" lines for all CVAR_ARCHIVE variables,
    /// in registration order. Used by the writeini command.
    pub fn write_variables(&self) -> String {
        let mut out = String::new();
        for var in &self.cvar_vars {
            if var.flags & CVAR_ARCHIVE != 0 {
                let _ = writeln!(out, "set {} \"{}\"", var.name, var.string);
            }
        }
        out
    }
}

impl Default for CvarContext {
    fn default() -> Self {
        Self::new()
    }
}
