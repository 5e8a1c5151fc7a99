use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentRegistry, CapabilityMatcher, Tier, DEFAULT_FUZZY_THRESHOLD};
use crate::orchestration::backend::{BackendSelector, CommandBackend, HeadlessBackend};
use crate::orchestration::coordinator::CoordinatorOptions;
use crate::orchestration::planner::{Planner, PlanningPolicy};
use crate::orchestration::retry::RetryPolicy;
use crate::routing::classifier::{DomainClassifier, DomainSpec, GENERAL_DOMAIN};
use crate::routing::mode::{default_mode_patterns, ModeSelector, DEFAULT_MODE_THRESHOLD};
use crate::routing::patterns::{specs, PatternSpec};
use crate::routing::router::{MatchStrategy, Route, Router};
use crate::routing::team::{Team, TeamMemberSpec, TeamRouter, TeamSpec};
use crate::routing::tier::{TierSelector, TierSpec};
use crate::{Error, Result};

/// Full configuration. Every section is optional in the file; missing
/// sections take the built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_domain_name")]
    pub default_domain: String,
    #[serde(default = "default_agent_role")]
    pub default_agent: String,
    #[serde(default = "default_domains")]
    pub domains: Vec<DomainSpec>,
    #[serde(default = "default_tiers")]
    pub tiers: TierSpec,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentSpec>,
    #[serde(default = "default_teams")]
    pub teams: Vec<TeamSpec>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

/// A worker as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub role: String,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Substring keywords.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Tokens matched by similarity rather than containment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fuzzy: Vec<String>,
    /// Regexes that pin a task to this worker.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_threshold: Option<f64>,
}

impl AgentSpec {
    fn new(role: &str, tier: Tier, domain: Option<&str>, parent: Option<&str>, keywords: &[&str]) -> Self {
        Self {
            role: role.to_string(),
            tier,
            domain: domain.map(str::to_string),
            parent: parent.map(str::to_string),
            capabilities: keywords.iter().map(|k| k.to_string()).collect(),
            fuzzy: Vec::new(),
            anchors: Vec::new(),
            fuzzy_threshold: None,
        }
    }

    fn with_fuzzy(mut self, tokens: &[&str]) -> Self {
        self.fuzzy = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    fn with_anchors(mut self, anchors: &[&str]) -> Self {
        self.anchors = anchors.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn to_agent(&self) -> Result<Agent> {
        let mut agent = Agent::new(&self.role, self.tier);
        agent.domain = self.domain.clone();
        agent.parent_role = self.parent.clone();

        let threshold = self.fuzzy_threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Validation(format!(
                "agent '{}': fuzzy_threshold must be within 0.0..=1.0",
                self.role
            )));
        }

        agent.capabilities.extend(self.capabilities.iter().map(|k| CapabilityMatcher::keyword(k)));
        agent
            .capabilities
            .extend(self.fuzzy.iter().map(|t| CapabilityMatcher::fuzzy(t, threshold)));
        for anchor in &self.anchors {
            agent.capabilities.push(CapabilityMatcher::anchor(anchor)?);
        }
        Ok(agent)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub strategy: MatchStrategy,
    /// Route through domain teams before the tiered router.
    #[serde(default)]
    pub use_teams: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub mode: PlanningPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_deadline_secs: Option<u64>,
    #[serde(default = "default_max_concurrency", skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_attempt_timeout_secs() -> u64 {
    300
}

fn default_max_concurrency() -> Option<usize> {
    Some(4)
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            group_timeout_secs: None,
            plan_deadline_secs: None,
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl CoordinatorConfig {
    pub fn options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            retry: RetryPolicy::new(
                self.max_retries,
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            ),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            group_timeout: self.group_timeout_secs.map(Duration::from_secs),
            plan_deadline: self.plan_deadline_secs.map(Duration::from_secs),
            max_concurrency: self.max_concurrency.filter(|n| *n > 0),
        }
    }
}

/// Simple backend: a local program that receives the prompt as its last argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleBackendConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SimpleBackendConfig {
    fn default() -> Self {
        Self {
            program: "echo".to_string(),
            args: Vec::new(),
        }
    }
}

/// Advanced backend: an LLM CLI run headless with JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedBackendConfig {
    /// Binary name or path; looked up on `PATH` when relative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default = "default_advanced_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_advanced_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub simple: SimpleBackendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedBackendConfig>,
    #[serde(default = "default_mode_threshold")]
    pub mode_threshold: u32,
    #[serde(default = "default_mode_patterns")]
    pub mode_patterns: Vec<PatternSpec>,
}

fn default_mode_threshold() -> u32 {
    DEFAULT_MODE_THRESHOLD
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            simple: SimpleBackendConfig::default(),
            advanced: None,
            mode_threshold: DEFAULT_MODE_THRESHOLD,
            mode_patterns: default_mode_patterns(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_domain: default_domain_name(),
            default_agent: default_agent_role(),
            domains: default_domains(),
            tiers: default_tiers(),
            agents: default_agents(),
            teams: default_teams(),
            routing: RoutingConfig::default(),
            planner: PlannerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            backend: BackendConfig::default(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn switchyard_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".switchyard"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::switchyard_dir()?.join("switchyard.toml"))
    }

    /// Configured log file, or `~/.switchyard/switchyard.log`.
    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(Self::switchyard_dir()?.join("switchyard.log")),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            agents = config.agents.len(),
            domains = config.domains.len(),
            teams = config.teams.len(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Cheap structural checks that do not need compiled tables.
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(Error::Validation("agent roster is empty".to_string()));
        }
        if self.coordinator.base_delay_ms > self.coordinator.max_delay_ms {
            return Err(Error::Validation(
                "coordinator.base_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }
        if self.coordinator.attempt_timeout_secs == 0 {
            return Err(Error::Validation(
                "coordinator.attempt_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_registry(&self) -> Result<AgentRegistry> {
        let agents = self
            .agents
            .iter()
            .map(AgentSpec::to_agent)
            .collect::<Result<Vec<_>>>()?;
        AgentRegistry::new(agents, &self.default_agent)
    }

    pub fn build_classifier(&self) -> Result<DomainClassifier> {
        DomainClassifier::new(&self.domains, &self.default_domain)
    }

    pub fn build_tier_selector(&self) -> Result<TierSelector> {
        TierSelector::new(&self.tiers)
    }

    pub fn build_router(&self) -> Result<Router> {
        let registry = Arc::new(self.build_registry()?);
        self.router_over(registry)
    }

    /// Team router whose teamless domains fall through to the tiered router.
    pub fn build_team_router(&self) -> Result<TeamRouter> {
        let registry = Arc::new(self.build_registry()?);
        let teams = self
            .teams
            .iter()
            .map(Team::compile)
            .collect::<Result<Vec<_>>>()?;
        let fallback = self.router_over(Arc::clone(&registry))?;
        Ok(TeamRouter::new(
            self.build_classifier()?,
            self.build_tier_selector()?,
            teams,
            registry,
        )?
        .with_fallback(fallback))
    }

    /// Router selected by `routing.use_teams`.
    pub fn build_route(&self) -> Result<Box<dyn Route>> {
        if self.routing.use_teams {
            Ok(Box::new(self.build_team_router()?))
        } else {
            Ok(Box::new(self.build_router()?))
        }
    }

    fn router_over(&self, registry: Arc<AgentRegistry>) -> Result<Router> {
        if self.routing.strategy == MatchStrategy::FirstMatch {
            warn!("first_match strategy: workers whose capabilities overlap an earlier worker's may never be selected");
        }
        Ok(Router::new(self.build_classifier()?, self.build_tier_selector()?, registry)
            .with_strategy(self.routing.strategy))
    }

    pub fn build_planner(&self) -> Planner {
        Planner::new(self.planner.mode)
    }

    pub fn build_mode_selector(&self) -> Result<ModeSelector> {
        ModeSelector::new(&self.backend.mode_patterns, self.backend.mode_threshold)
    }

    /// Simple backend always; advanced only when configured and found.
    pub fn build_backends(&self) -> Result<BackendSelector> {
        let simple = CommandBackend::new(&self.backend.simple.program, &self.backend.simple.args);
        let selector = BackendSelector::new(Arc::new(simple));

        let Some(advanced) = &self.backend.advanced else {
            return Ok(selector);
        };
        match HeadlessBackend::locate(advanced.binary.as_deref()) {
            Ok(backend) => {
                let backend = backend.with_timeout(Duration::from_secs(advanced.timeout_secs));
                Ok(selector.with_advanced(Arc::new(backend), self.build_mode_selector()?))
            }
            Err(e) => {
                warn!(error = %e, "advanced backend disabled");
                Ok(selector)
            }
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn default_domain_name() -> String {
    GENERAL_DOMAIN.to_string()
}

fn default_agent_role() -> String {
    "orchestrator".to_string()
}

fn default_domains() -> Vec<DomainSpec> {
    vec![
        DomainSpec::new(
            "testing",
            1,
            specs(&[
                (r"^\s*\[testing\]", 50),
                (r"\btests?\b|\btesting\b", 3),
                (r"\bunit\b|\bintegration\b|\bend-to-end\b|\be2e\b", 3),
                (r"\bmocks?\b|\bfixtures?\b|\bstubs?\b", 2),
                (r"\bcoverage\b|\bregression\b", 2),
            ]),
        ),
        DomainSpec::new(
            "frontend",
            2,
            specs(&[
                (r"^\s*\[frontend\]", 50),
                (r"\bfrontend\b|\bfront-end\b", 4),
                (r"\breact\b|\bvue\b|\bsvelte\b", 4),
                (r"\bcomponents?\b", 3),
                (r"\bcss\b|\bstyl(e|ing)\b", 3),
                (r"\bui\b|\bux\b|\baccessibility\b", 3),
                (r"\bpage\b|\bform\b|\bbutton\b", 2),
            ]),
        ),
        DomainSpec::new(
            "backend",
            3,
            specs(&[
                (r"^\s*\[backend\]", 50),
                (r"\bapi\b", 3),
                (r"\brest\b|\bgraphql\b|\bgrpc\b", 3),
                (r"\bendpoints?\b", 3),
                (r"\bdatabase\b|\bsql\b|\bschema\b|\bmigrations?\b", 3),
                (r"\bauth(entication|orization)?\b|\blogin\b", 2),
                (r"\bbackend\b|\bserver\b|\bservice\b", 2),
                (r"\bcache\b|\bqueue\b", 2),
            ]),
        ),
        DomainSpec::new(
            "infrastructure",
            4,
            specs(&[
                (r"^\s*\[infra(structure)?\]", 50),
                (r"\bdocker\b|\bkubernetes\b|\bk8s\b|\bhelm\b", 4),
                (r"\bdeploy(ment)?\b", 3),
                (r"\bterraform\b|\bmonitoring\b|\balerts?\b", 3),
                (r"\bci\b|\bpipeline\b", 2),
            ]),
        ),
        DomainSpec::new(
            "documentation",
            5,
            specs(&[
                (r"^\s*\[docs?\]", 50),
                (r"\bdocs?\b|\bdocumentation\b|\breadme\b", 3),
                (r"\bguide\b|\btutorial\b|\bchangelog\b", 3),
                (r"\bdocument\b", 2),
            ]),
        ),
    ]
}

fn default_tiers() -> TierSpec {
    TierSpec {
        orchestration: specs(&[
            (r"\bplan(ning)?\b", 3),
            (r"\bsprint\b", 3),
            (r"\bcoordinat(e|ion)\b", 3),
            (r"\breview\b", 3),
            (r"\baudit\b", 4),
            (r"\bquality (standards?|gates?)\b", 4),
            (r"\broadmap\b|\bprioriti[sz]e\b", 3),
        ]),
        domain_lead: specs(&[
            (r"\bdesign\b", 3),
            (r"\barchitect(ure)?\b", 4),
            (r"\bstrategy\b", 3),
            (r"\bapi design\b", 2),
            (r"\btest strategy\b", 3),
            (r"\bspecif(y|ication)\b", 2),
        ]),
    }
}

fn default_agents() -> Vec<AgentSpec> {
    use Tier::{DomainLead, Orchestration, Specialist};
    vec![
        AgentSpec::new(
            "orchestrator",
            Orchestration,
            None,
            None,
            &["plan", "sprint", "coordinate", "roadmap", "prioritize"],
        ),
        AgentSpec::new(
            "qa-lead",
            Orchestration,
            Some("testing"),
            Some("orchestrator"),
            &["review", "audit", "quality"],
        ),
        AgentSpec::new(
            "frontend-lead",
            DomainLead,
            Some("frontend"),
            Some("orchestrator"),
            &["design", "ux", "component architecture"],
        )
        .with_fuzzy(&["design system"]),
        AgentSpec::new(
            "backend-lead",
            DomainLead,
            Some("backend"),
            Some("orchestrator"),
            &["api design", "architecture", "schema design"],
        ),
        AgentSpec::new(
            "testing-lead",
            DomainLead,
            Some("testing"),
            Some("qa-lead"),
            &["test strategy", "test plan", "coverage"],
        ),
        AgentSpec::new(
            "frontend-dev",
            Specialist,
            Some("frontend"),
            Some("frontend-lead"),
            &["component", "css", "page", "form", "react"],
        )
        .with_fuzzy(&["accessibility"]),
        AgentSpec::new(
            "backend-dev",
            Specialist,
            Some("backend"),
            Some("backend-lead"),
            &["endpoint", "service", "handler", "login", "auth"],
        )
        .with_fuzzy(&["authentication"]),
        AgentSpec::new(
            "db-specialist",
            Specialist,
            Some("backend"),
            Some("backend-lead"),
            &["schema", "migration", "sql", "database", "query"],
        ),
        AgentSpec::new(
            "unit-tester",
            Specialist,
            Some("testing"),
            Some("testing-lead"),
            &["unit", "mock", "fixture"],
        ),
        AgentSpec::new(
            "integration-tester",
            Specialist,
            Some("testing"),
            Some("testing-lead"),
            &["integration", "end-to-end", "e2e", "contract"],
        ),
        AgentSpec::new(
            "devops",
            Specialist,
            Some("infrastructure"),
            Some("orchestrator"),
            &["deploy", "docker", "kubernetes", "pipeline", "terraform", "monitoring"],
        ),
        AgentSpec::new(
            "docs-writer",
            Specialist,
            Some("documentation"),
            Some("orchestrator"),
            &["docs", "documentation", "readme", "guide", "changelog"],
        )
        .with_anchors(&[r"^\s*\[docs?\]"]),
    ]
}

fn default_teams() -> Vec<TeamSpec> {
    let member = |role: &str, table: &[(&str, u32)]| TeamMemberSpec {
        role: role.to_string(),
        patterns: specs(table),
    };
    vec![
        TeamSpec {
            name: "testing".to_string(),
            domain: "testing".to_string(),
            lead: "testing-lead".to_string(),
            members: vec![
                member(
                    "unit-tester",
                    &[(r"\bunit\b", 3), (r"\bmocks?\b|\bstubs?\b|\bfixtures?\b", 3)],
                ),
                member(
                    "integration-tester",
                    &[
                        (r"\bintegration\b", 3),
                        (r"\bend-to-end\b|\be2e\b", 3),
                        (r"\bcontract\b", 2),
                    ],
                ),
            ],
        },
        TeamSpec {
            name: "backend".to_string(),
            domain: "backend".to_string(),
            lead: "backend-lead".to_string(),
            members: vec![
                member(
                    "backend-dev",
                    &[
                        (r"\bendpoints?\b|\bhandlers?\b", 3),
                        (r"\blogin\b|\bauth", 2),
                        (r"\bimplement\b", 1),
                    ],
                ),
                member(
                    "db-specialist",
                    &[
                        (r"\bschema\b|\bmigrations?\b", 3),
                        (r"\bsql\b|\bquery\b|\bindex(es)?\b", 3),
                    ],
                ),
            ],
        },
    ]
}
