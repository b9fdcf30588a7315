use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{log_debug, log_info, log_warn};

pub const DEFAULT_MODE: &str = "default";

const CYBERSECURITY_PROMPT: &str = "You are an expert cybersecurity agent with deep knowledge in:
- Threat analysis and vulnerability assessment
- Network security and intrusion detection
- Malware analysis and incident response
- Security compliance (NIST, CIS, ISO 27001)
- Cryptography and secure coding practices
- Security architecture and risk management
- Cloud security and container orchestration
- Application security and OWASP principles

Your responsibilities:
1. Analyze security threats and provide actionable remediation steps
2. Assess vulnerabilities in systems, networks, and code
3. Design secure solutions and architectures
4. Provide security best practices and compliance guidance
5. Help with incident response and forensics
6. Recommend security tools and technologies

Always:
- Prioritize critical security risks
- Provide specific, actionable recommendations
- Consider business impact alongside security requirements
- Reference relevant security standards and frameworks
- Explain technical concepts clearly
- Ask clarifying questions when context is needed

When analyzing security issues:
1. Identify the threat/vulnerability
2. Assess severity and impact
3. Determine root cause
4. Recommend remediation steps
5. Suggest preventive measures
6. Outline monitoring/detection strategies";

const THREAT_ANALYSIS_PROMPT: &str = "You are a threat analysis expert. When analyzing security threats:
1. Identify threat actors and their motivations
2. Assess attack vectors and techniques
3. Evaluate impact potential
4. Recommend detection and mitigation strategies
5. Suggest long-term defensive measures";

const INCIDENT_RESPONSE_PROMPT: &str = "You are an incident response specialist. When handling security incidents:
1. Assess the scope and severity
2. Contain the threat immediately
3. Preserve evidence for forensics
4. Eradicate the threat
5. Recovery and restoration steps
6. Post-incident analysis and lessons learned
7. Implement preventive measures";

const VULNERABILITY_PROMPT: &str = "You are a vulnerability assessment expert. When analyzing vulnerabilities:
1. Identify and classify the vulnerability
2. Assess exploitability and impact
3. Determine affected systems and scope
4. Recommend patches or workarounds
5. Suggest compensating controls
6. Create a remediation timeline";

const COMPLIANCE_PROMPT: &str = "You are a security compliance auditor. When conducting audits:
1. Review compliance requirements (NIST, CIS, ISO 27001, SOC 2, etc.)
2. Assess current controls and gaps
3. Identify non-conformance issues
4. Recommend remediation actions
5. Create compliance roadmap
6. Document audit findings";

const SECURE_CODING_PROMPT: &str = "You are a secure coding expert. When reviewing code:
1. Identify common vulnerabilities (OWASP Top 10, CWE)
2. Assess secure coding practices
3. Recommend secure alternatives
4. Suggest testing and validation approaches
5. Provide security-focused code review guidelines";

const NETWORK_PROMPT: &str = "You are a network security architect. When designing networks:
1. Design layered defense architecture
2. Recommend segmentation strategies
3. Configure access controls
4. Design monitoring and logging
5. Plan incident response procedures
6. Implement DDoS and intrusion prevention";

const MALWARE_PROMPT: &str = "You are a malware analysis expert. When analyzing malware:
1. Identify malware type and family
2. Analyze behavior and capabilities
3. Determine infrastructure (C2, exfiltration)
4. Assess organization impact
5. Recommend detection signatures
6. Create remediation procedures";

const BUILTIN_MODES: &[(&str, &str, &str)] = &[
    (DEFAULT_MODE, "General cybersecurity expert", CYBERSECURITY_PROMPT),
    ("threat_analysis", "Threat actors, attack vectors and mitigations", THREAT_ANALYSIS_PROMPT),
    ("incident_response", "Containment, forensics and recovery", INCIDENT_RESPONSE_PROMPT),
    ("vulnerability", "Vulnerability assessment and remediation planning", VULNERABILITY_PROMPT),
    ("compliance", "Compliance audits (NIST, CIS, ISO 27001, SOC 2)", COMPLIANCE_PROMPT),
    ("secure_coding", "Secure code review (OWASP Top 10, CWE)", SECURE_CODING_PROMPT),
    ("network", "Network security architecture", NETWORK_PROMPT),
    ("malware", "Malware analysis and detection", MALWARE_PROMPT),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSource {
    Builtin,
    File(PathBuf),
}

/// A persona the agent can take on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub source: ModeSource,
}

/// Built-in modes merged with user-defined ones
#[derive(Debug, Clone)]
pub struct ModeCatalog {
    modes: BTreeMap<String, Mode>,
}

impl ModeCatalog {
    pub fn builtin() -> Self {
        let modes = BUILTIN_MODES
            .iter()
            .map(|(name, description, prompt)| {
                (
                    name.to_string(),
                    Mode {
                        name: name.to_string(),
                        description: description.to_string(),
                        prompt: prompt.to_string(),
                        source: ModeSource::Builtin,
                    },
                )
            })
            .collect();
        Self { modes }
    }

    /// Built-in modes plus anything under ~/.secagent/modes
    pub fn load() -> Result<Self> {
        let mut catalog = Self::builtin();
        let dir = get_modes_dir()?;
        if dir.is_dir() {
            catalog.merge_dir(&dir)?;
        } else {
            log_debug(&format!("No user modes directory at {}", dir.display()));
        }
        Ok(catalog)
    }

    /// Add or override modes from `<dir>/<name>.md` files
    pub fn merge_dir(&mut self, dir: &Path) -> Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read modes directory: {}", dir.display()))?;

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    if self.modes.contains_key(name) {
                        log_info(&format!("Mode '{}' overridden by {}", name, path.display()));
                    } else {
                        log_info(&format!("Loaded mode '{}' from {}", name, path.display()));
                    }
                    self.modes.insert(
                        name.to_string(),
                        Mode {
                            name: name.to_string(),
                            description: describe(&content),
                            prompt: content.trim().to_string(),
                            source: ModeSource::File(path.clone()),
                        },
                    );
                }
                Ok(_) => log_warn(&format!("Ignoring empty mode file {}", path.display())),
                Err(e) => log_warn(&format!("Failed to read mode file {}: {}", path.display(), e)),
            }
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Mode> {
        self.modes.get(name)
    }

    /// Modes sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Mode> {
        self.modes.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modes.keys().map(String::as_str).collect()
    }
}

/// First non-empty line of a mode file, without markdown heading marks
fn describe(content: &str) -> String {
    let line = content
        .lines()
        .map(|l| l.trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    if line.chars().count() > 60 {
        let short: String = line.chars().take(57).collect();
        format!("{}...", short)
    } else {
        line.to_string()
    }
}

/// Get the directory holding user-defined modes
pub fn get_modes_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home_dir.join(".secagent").join("modes"))
}
