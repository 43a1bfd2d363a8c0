//! Embedding API
//!
//! A [`Vm`] owns one [`Runtime`]. Hosts configure it through [`VmBuilder`],
//! then run static methods on fresh threads. Cloning a `Vm` shares the
//! runtime, so several host threads may execute against the same classes.

use crate::heap::ObjectRef;
use crate::interpreter::Interpreter;
use crate::loader::ClassSource;
use crate::native::{NativeContext, NativeRegistry};
use crate::profiler::Profile;
use crate::runtime::Runtime;
use crate::thread::Thread;
use crate::value::Value;
use crate::{Class, VmResult};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Default frame limit per thread
pub const DEFAULT_MAX_FRAMES: usize = 2048;

/// Descriptor of a program entry point
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// VM configuration
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Maximum frames per thread
    pub max_frames: usize,

    /// Log every executed instruction at trace level
    pub trace_instructions: bool,

    /// Collect opcode and call counts
    pub profile: bool,

    /// Wall-clock limit per interpreter run
    pub timeout: Option<Duration>,

    /// Host-controlled flag; raising it stops every running thread
    pub abort: Option<Arc<AtomicBool>>,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            trace_instructions: false,
            profile: false,
            timeout: None,
            abort: None,
        }
    }
}

/// A configured virtual machine
#[derive(Debug, Clone)]
pub struct Vm {
    runtime: Arc<Runtime>,
}

impl Vm {
    /// Start configuring a VM
    pub fn builder() -> VmBuilder {
        VmBuilder::default()
    }

    /// VM with default options, the default natives and only the bootstrap
    /// classes
    pub fn new() -> Self {
        VmBuilder::default().build()
    }

    /// Shared runtime
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Load and link a class without initializing it
    pub fn load_class(&self, name: &str) -> VmResult<Arc<Class>> {
        self.runtime.load_class(name)
    }

    /// Empty thread using the configured frame limit
    pub fn new_thread(&self) -> Thread {
        Thread::new(self.runtime.options().max_frames)
    }

    /// Interpreter bound to this VM's runtime
    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(&self.runtime)
    }

    /// Run a static method to completion on a fresh thread
    pub fn invoke_static(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        let mut thread = self.new_thread();
        self.interpreter()
            .invoke_static(&mut thread, class_name, name, descriptor, args)
    }

    /// Run `public static void main(String[])` of `class_name`
    pub fn run_main(&self, class_name: &str, args: &[String]) -> VmResult<()> {
        let argv = self.runtime.new_string_array(args)?;
        log::info!("running {}.main with {} argument(s)", class_name, args.len());
        self.invoke_static(class_name, "main", MAIN_DESCRIPTOR, &[argv.into()])?;
        Ok(())
    }

    /// Allocate a string
    pub fn new_string(&self, text: &str) -> VmResult<ObjectRef> {
        self.runtime.new_string(text)
    }

    /// Read a string
    pub fn string_value(&self, string: &ObjectRef) -> VmResult<String> {
        self.runtime.string_value(string)
    }

    /// Counters collected so far, if profiling is enabled
    pub fn profile(&self) -> Option<Profile> {
        self.runtime.profiler().map(|p| p.snapshot())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Vm`]
pub struct VmBuilder {
    options: VmOptions,
    boot_sources: Vec<Arc<dyn ClassSource>>,
    sources: Vec<Arc<dyn ClassSource>>,
    natives: NativeRegistry,
}

impl Default for VmBuilder {
    fn default() -> Self {
        Self {
            options: VmOptions::default(),
            boot_sources: Vec::new(),
            sources: Vec::new(),
            natives: NativeRegistry::with_defaults(),
        }
    }
}

impl VmBuilder {
    /// Replace the options
    pub fn options(mut self, options: VmOptions) -> Self {
        self.options = options;
        self
    }

    /// Append an application class source
    pub fn source(mut self, source: impl ClassSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Append a bootstrap class source, searched before the built-in classes
    pub fn boot_source(mut self, source: impl ClassSource + 'static) -> Self {
        self.boot_sources.push(Arc::new(source));
        self
    }

    /// Register or replace a native method
    pub fn native<F>(mut self, class: &str, name: &str, descriptor: &str, f: F) -> Self
    where
        F: Fn(&mut NativeContext<'_>) -> VmResult<Option<Value>> + Send + Sync + 'static,
    {
        self.natives.register(class, name, descriptor, f);
        self
    }

    /// Add every entry of `natives`, replacing duplicates
    pub fn natives(mut self, natives: NativeRegistry) -> Self {
        self.natives.extend(natives);
        self
    }

    /// Create the VM
    pub fn build(self) -> Vm {
        let runtime = Runtime::new(self.options, self.boot_sources, self.sources, self.natives);
        log::debug!("created VM with {} native method(s)", runtime.natives().len());
        Vm {
            runtime: Arc::new(runtime),
        }
    }
}
