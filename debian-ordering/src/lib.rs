// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian version ordering, architecture matching, and build ordering.

This crate defines pure Rust implementations of the Debian packaging primitives needed
to decide in which order a set of source packages must be built.

The [package_version] module implements Debian package version string parsing,
rendering, and comparison. [package_version::PackageVersion] is the main type used for
this. Besides policy comparison, a version can be turned into a *comparable string*
whose byte ordering matches version ordering, which is useful as a database or
key-value store sort key.

The [architecture] module parses architecture names like `amd64`, `linux-any` or
`x32` into [architecture::Architecture] tuples and implements wildcard matching
between them. [architecture::ArchitectureSet] represents the `[amd64 !i386]`
restriction lists seen in dependency fields.

The [dependency] module parses the dependency meta language, e.g.
`libc6 (>= 2.4), libfoo [linux-any] | libbar`, into a [dependency::Dependency] and
resolves which alternatives apply to a given architecture.

The [build_order] module sorts packages topologically by their dependencies and
reports cycles. [build_order::source_build_order] does this for a set of source
packages, resolving build dependencies on binary packages to the sources producing
them.

Control files are parsed with the primitives in the [control] module. Typed records
like [schema::SourcePackage] and [schema::BinaryPackage] are decoded from control
paragraphs by the [schema] module.

All operations are synchronous and free of shared state. Logging goes through the
`log` crate; no logger is installed.
*/

pub mod architecture;
pub mod build_order;
pub mod control;
pub mod dependency;
pub mod error;
pub mod package_version;
pub mod schema;
