//! Wrapper layering for the child command line
//!
//! Wrappers are applied innermost first: chroot, then fakeroot, then
//! fakechroot. Each layer takes the previous argument vector as its own
//! trailing arguments. Fakechroot has to be the outermost process because it
//! intercepts the C-library calls that fakeroot and chroot make.

use crate::errors::{RibError, Result};
use crate::execution::flags::Flag;
use crate::execution::request::ExecutionRequest;
use crate::utils::ExecutableResolver;
use log::debug;

/// Rewrites a request's program and argument vector
#[derive(Debug, Clone, Default)]
pub struct ArgumentComposer {
    resolver: ExecutableResolver,
}

impl ArgumentComposer {
    pub fn new(resolver: ExecutableResolver) -> Self {
        Self { resolver }
    }

    /// Wrap the request in every wrapper its flags ask for.
    pub fn compose(&self, request: &mut ExecutionRequest) -> Result<()> {
        if request.flags.contains(Flag::Chroot) {
            let root = request
                .chroot_dir
                .clone()
                .ok_or_else(|| RibError::Configuration("chroot dir not defined".to_string()))?;

            // argv[0] must name the program as seen from inside the chroot
            let inner = request.program.to_string_lossy().into_owned();
            if request.args.is_empty() {
                request.args.push(inner);
            } else {
                request.args[0] = inner;
            }

            let chroot = self.wrap(request, "chroot")?;
            prepend(request, [chroot, root.to_string_lossy().into_owned()]);
        }

        if request.flags.contains(Flag::Fakeroot) {
            let fakeroot = self.wrap(request, "fakeroot")?;
            match request.fakeroot_save.clone() {
                Some(save) => {
                    let save = save.to_string_lossy().into_owned();
                    prepend(
                        request,
                        [
                            fakeroot,
                            "-s".to_string(),
                            save.clone(),
                            "-i".to_string(),
                            save,
                            "--".to_string(),
                        ],
                    );
                }
                None => prepend(request, [fakeroot, "--".to_string()]),
            }
        }

        if request.flags.contains(Flag::Fakechroot) {
            let fakechroot = self.wrap(request, "fakechroot")?;
            prepend(
                request,
                [
                    fakechroot,
                    "--environment".to_string(),
                    "debootstrap".to_string(),
                    "--".to_string(),
                ],
            );
        }

        debug!("Composed command line: {:?}", request.args);
        Ok(())
    }

    /// Point the request at a wrapper and return the wrapper's argv[0].
    fn wrap(&self, request: &mut ExecutionRequest, wrapper: &str) -> Result<String> {
        let path = self.resolver.resolve(wrapper)?;
        let arg0 = path.to_string_lossy().into_owned();
        request.program = path;
        Ok(arg0)
    }
}

fn prepend<const N: usize>(request: &mut ExecutionRequest, head: [String; N]) {
    request.args.splice(0..0, head);
}
