// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Typed records decoded from control paragraphs.

Each record type declares a table of [FieldSpec]: the field name, whether it is
mandatory and a function storing the parsed value on the record. The
[ParagraphSchema::from_paragraph] provided method walks that table, so decoding is
driven by data declared next to the type rather than by per-field getters.
 */

use {
    crate::{
        architecture::{parse_architecture_list, Architecture},
        control::ControlParagraph,
        dependency::{Dependency, Possibility},
        error::{DebianError, Result},
        package_version::PackageVersion,
    },
    serde::Serialize,
};

/// Describes how one control field is decoded into a record of type `T`.
pub struct FieldSpec<T> {
    /// Field name. Matched case insensitively.
    pub key: &'static str,
    /// Whether decoding fails when the field is absent.
    pub required: bool,
    /// Parse the field value and store it on the record.
    pub apply: fn(&mut T, &str) -> Result<()>,
}

/// A record that can be decoded from a [ControlParagraph].
pub trait ParagraphSchema: Default + Sized + 'static {
    /// Fields understood by this record, applied in order.
    const FIELDS: &'static [FieldSpec<Self>];

    /// Check invariants spanning several fields once all fields are applied.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Decode a record from a paragraph.
    ///
    /// Fields not named in [Self::FIELDS] are ignored.
    fn from_paragraph(paragraph: &ControlParagraph<'_>) -> Result<Self> {
        let mut record = Self::default();

        for field in Self::FIELDS {
            match paragraph.field_str(field.key) {
                Some(value) => (field.apply)(&mut record, value)
                    .map_err(|e| DebianError::ControlFieldValue(field.key, Box::new(e)))?,
                None if field.required => {
                    return Err(DebianError::ControlRequiredFieldMissing(
                        field.key.to_string(),
                    ));
                }
                None => {}
            }
        }

        record.validate()?;

        Ok(record)
    }
}

/// A source package, as described by a `debian/control` general paragraph or a
/// `Sources` index entry.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SourcePackage {
    name: String,
    version: Option<PackageVersion>,
    maintainer: Option<String>,
    architectures: Vec<Architecture>,
    binaries: Vec<String>,
    build_depends: Option<Dependency>,
    build_depends_indep: Option<Dependency>,
    build_depends_arch: Option<Dependency>,
}

impl ParagraphSchema for SourcePackage {
    const FIELDS: &'static [FieldSpec<Self>] = &[
        // `Sources` indices name the source in `Package`, `debian/control` in `Source`.
        FieldSpec {
            key: "Package",
            required: false,
            apply: |record, value| {
                record.name = value.to_string();
                Ok(())
            },
        },
        FieldSpec {
            key: "Source",
            required: false,
            apply: |record, value| {
                record.name = value.to_string();
                Ok(())
            },
        },
        FieldSpec {
            key: "Version",
            required: false,
            apply: |record, value| {
                record.version = Some(PackageVersion::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Maintainer",
            required: false,
            apply: |record, value| {
                record.maintainer = Some(value.to_string());
                Ok(())
            },
        },
        FieldSpec {
            key: "Architecture",
            required: false,
            apply: |record, value| {
                record.architectures = parse_architecture_list(value)?;
                Ok(())
            },
        },
        FieldSpec {
            key: "Binary",
            required: false,
            apply: |record, value| {
                record.binaries = value
                    .split(',')
                    .map(|x| x.trim())
                    .filter(|x| !x.is_empty())
                    .map(|x| x.to_string())
                    .collect();
                Ok(())
            },
        },
        FieldSpec {
            key: "Build-Depends",
            required: false,
            apply: |record, value| {
                record.build_depends = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Build-Depends-Indep",
            required: false,
            apply: |record, value| {
                record.build_depends_indep = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Build-Depends-Arch",
            required: false,
            apply: |record, value| {
                record.build_depends_arch = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
    ];

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            Err(DebianError::ControlRequiredFieldMissing("Source".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SourcePackage {
    /// The source package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&PackageVersion> {
        self.version.as_ref()
    }

    pub fn maintainer(&self) -> Option<&str> {
        self.maintainer.as_deref()
    }

    /// Architectures the source builds for, from the `Architecture` field.
    pub fn architectures(&self) -> &[Architecture] {
        &self.architectures
    }

    /// Binary packages built from this source, from the `Binary` field.
    pub fn binaries(&self) -> &[String] {
        &self.binaries
    }

    pub fn build_depends(&self) -> Option<&Dependency> {
        self.build_depends.as_ref()
    }

    pub fn build_depends_indep(&self) -> Option<&Dependency> {
        self.build_depends_indep.as_ref()
    }

    pub fn build_depends_arch(&self) -> Option<&Dependency> {
        self.build_depends_arch.as_ref()
    }

    /// Build dependency possibilities that apply when building on an architecture.
    ///
    /// Covers `Build-Depends`, `Build-Depends-Arch` and `Build-Depends-Indep`, in that
    /// order, each resolved with [Dependency::get_possibilities].
    pub fn build_dependency_possibilities(&self, arch: &Architecture) -> Vec<&Possibility> {
        [
            &self.build_depends,
            &self.build_depends_arch,
            &self.build_depends_indep,
        ]
        .into_iter()
        .flatten()
        .flat_map(|dep| dep.get_possibilities(arch))
        .collect()
    }
}

/// A binary package, as described by a `DEBIAN/control` file or a `Packages` index
/// entry.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BinaryPackage {
    name: String,
    source: Option<String>,
    version: Option<PackageVersion>,
    architecture: Option<Architecture>,
    depends: Option<Dependency>,
    pre_depends: Option<Dependency>,
    recommends: Option<Dependency>,
    suggests: Option<Dependency>,
    conflicts: Option<Dependency>,
    breaks: Option<Dependency>,
    provides: Option<Dependency>,
}

impl ParagraphSchema for BinaryPackage {
    const FIELDS: &'static [FieldSpec<Self>] = &[
        FieldSpec {
            key: "Package",
            required: true,
            apply: |record, value| {
                record.name = value.to_string();
                Ok(())
            },
        },
        // May carry a version when it differs from the binary's: `foo (1.2-1)`.
        FieldSpec {
            key: "Source",
            required: false,
            apply: |record, value| {
                record.source = value.split_ascii_whitespace().next().map(|x| x.to_string());
                Ok(())
            },
        },
        FieldSpec {
            key: "Version",
            required: false,
            apply: |record, value| {
                record.version = Some(PackageVersion::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Architecture",
            required: false,
            apply: |record, value| {
                record.architecture = Some(Architecture::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Depends",
            required: false,
            apply: |record, value| {
                record.depends = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Pre-Depends",
            required: false,
            apply: |record, value| {
                record.pre_depends = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Recommends",
            required: false,
            apply: |record, value| {
                record.recommends = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Suggests",
            required: false,
            apply: |record, value| {
                record.suggests = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Conflicts",
            required: false,
            apply: |record, value| {
                record.conflicts = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Breaks",
            required: false,
            apply: |record, value| {
                record.breaks = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
        FieldSpec {
            key: "Provides",
            required: false,
            apply: |record, value| {
                record.provides = Some(Dependency::parse(value)?);
                Ok(())
            },
        },
    ];
}

impl BinaryPackage {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the source package this binary was built from.
    ///
    /// Defaults to the binary name when there is no `Source` field.
    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    pub fn version(&self) -> Option<&PackageVersion> {
        self.version.as_ref()
    }

    pub fn architecture(&self) -> Option<&Architecture> {
        self.architecture.as_ref()
    }

    pub fn depends(&self) -> Option<&Dependency> {
        self.depends.as_ref()
    }

    pub fn pre_depends(&self) -> Option<&Dependency> {
        self.pre_depends.as_ref()
    }

    pub fn recommends(&self) -> Option<&Dependency> {
        self.recommends.as_ref()
    }

    pub fn suggests(&self) -> Option<&Dependency> {
        self.suggests.as_ref()
    }

    pub fn conflicts(&self) -> Option<&Dependency> {
        self.conflicts.as_ref()
    }

    pub fn breaks(&self) -> Option<&Dependency> {
        self.breaks.as_ref()
    }

    pub fn provides(&self) -> Option<&Dependency> {
        self.provides.as_ref()
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{control::ControlFile, dependency::DependencyError, package_version::VersionError},
        indoc::indoc,
    };

    fn first_paragraph(s: &str) -> Result<ControlParagraph<'static>> {
        ControlFile::parse_str(s)?
            .into_paragraphs()
            .next()
            .ok_or_else(|| DebianError::ControlParseError("no paragraph".to_string()))
    }

    #[test]
    fn source_from_debian_control() -> Result<()> {
        let para = first_paragraph(indoc! {"
            Source: hello
            Maintainer: Jane Doe <jane@example.com>
            Build-Depends: debhelper-compat (= 13),
             libfoo-dev [linux-any] | libfoo-compat-dev,
             libwin32-dev [!linux-any]
            Build-Depends-Indep: texinfo
            Standards-Version: 4.6.0
        "})?;

        let source = SourcePackage::from_paragraph(&para)?;
        assert_eq!(source.name(), "hello");
        assert_eq!(source.maintainer(), Some("Jane Doe <jane@example.com>"));
        assert!(source.version().is_none());
        assert!(source.binaries().is_empty());
        assert!(source.build_depends_arch().is_none());
        assert_eq!(
            source.build_depends_indep().map(|d| d.to_string()),
            Some("texinfo".to_string())
        );

        let names = |arch: &str| -> Result<Vec<String>> {
            Ok(source
                .build_dependency_possibilities(&Architecture::parse(arch)?)
                .into_iter()
                .map(|p| p.name.clone())
                .collect())
        };

        assert_eq!(
            names("amd64")?,
            vec!["debhelper-compat", "libfoo-dev", "texinfo"]
        );
        assert_eq!(
            names("kfreebsd-amd64")?,
            vec![
                "debhelper-compat",
                "libfoo-compat-dev",
                "libwin32-dev",
                "texinfo"
            ]
        );

        Ok(())
    }

    #[test]
    fn source_from_sources_index() -> Result<()> {
        let para = first_paragraph(indoc! {"
            Package: greet
            Binary: libgreet1, libgreet-dev,
             greet-doc
            Version: 1:1.0-1
            Architecture: any all
        "})?;

        let source = SourcePackage::from_paragraph(&para)?;
        assert_eq!(source.name(), "greet");
        assert_eq!(source.binaries(), &["libgreet1", "libgreet-dev", "greet-doc"]);
        assert_eq!(source.version(), Some(&PackageVersion::parse("1:1.0-1")?));
        assert_eq!(
            source.architectures(),
            &[Architecture::any(), Architecture::all()]
        );
        assert!(source
            .build_dependency_possibilities(&Architecture::parse("amd64")?)
            .is_empty());

        Ok(())
    }

    #[test]
    fn source_errors() -> Result<()> {
        let para = first_paragraph("Version: 1.0\n")?;
        assert!(matches!(
            SourcePackage::from_paragraph(&para),
            Err(DebianError::ControlRequiredFieldMissing(field)) if field == "Source"
        ));

        let para = first_paragraph("Source: hello\nVersion: 1.0 beta\n")?;
        match SourcePackage::from_paragraph(&para) {
            Err(DebianError::ControlFieldValue("Version", inner)) => {
                assert!(matches!(
                    *inner,
                    DebianError::Version(VersionError::EmbeddedWhitespace(_))
                ));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let para = first_paragraph("Source: hello\nBuild-Depends: foo (>= 1.0\n")?;
        match SourcePackage::from_paragraph(&para) {
            Err(DebianError::ControlFieldValue("Build-Depends", inner)) => {
                assert!(matches!(
                    *inner,
                    DebianError::Dependency(DependencyError::UnmatchedDelimiter('(', _))
                ));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn binary_package() -> Result<()> {
        let para = first_paragraph(indoc! {"
            Package: libgreet1
            Source: greet (1.0-1)
            Version: 1.0-1+b1
            Architecture: amd64
            Depends: libc6 (>= 2.34), ${misc:Depends}
            Pre-Depends: dpkg (>= 1.15)
            Breaks: libgreet0 (<< 1.0)
            Provides: libgreet
        "})?;

        let binary = BinaryPackage::from_paragraph(&para)?;
        assert_eq!(binary.name(), "libgreet1");
        assert_eq!(binary.source(), "greet");
        assert_eq!(binary.version(), Some(&PackageVersion::parse("1.0-1+b1")?));
        assert_eq!(binary.architecture(), Some(&Architecture::parse("amd64")?));
        assert_eq!(
            binary
                .depends()
                .map(|d| d.get_substvars().len()),
            Some(1)
        );
        assert!(binary.pre_depends().is_some());
        assert!(binary.breaks().is_some());
        assert!(binary.provides().is_some());
        assert!(binary.recommends().is_none());
        assert!(binary.suggests().is_none());
        assert!(binary.conflicts().is_none());

        let binary = BinaryPackage::from_paragraph(&first_paragraph("Package: hello\n")?)?;
        assert_eq!(binary.source(), "hello");

        assert!(matches!(
            BinaryPackage::from_paragraph(&first_paragraph("Version: 1.0\n")?),
            Err(DebianError::ControlRequiredFieldMissing(field)) if field == "Package"
        ));

        Ok(())
    }
}
