use std::collections::{BTreeMap, BTreeSet};

/// A named identity: the authenticated user, or a role name inside a
/// group. SSO backends attach the scalar userinfo fields as attributes.
/// Identity is the name alone; attributes are payload, so two principals
/// with the same name are the same principal in any set.
#[derive(Debug, Clone)]
pub struct Principal {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Principal {}

impl Ord for Principal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl PartialOrd for Principal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

/// A named collection of principals, used to represent roles (commonly a
/// group called `Roles`) or caller identity sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    members: BTreeSet<Principal>,
}

impl Group {
    pub fn add_member(&mut self, member: Principal) {
        self.members.insert(member);
    }

    pub fn remove_member(&mut self, name: &str) {
        self.members.retain(|member| member.name() != name);
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.iter().any(|member| member.name() == name)
    }

    pub fn members(&self) -> impl Iterator<Item = &Principal> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The security aggregate for one authentication session: the identity
/// principals added by committed login modules plus the named groups
/// carrying their role memberships. Created per attempt, mutated only by
/// `commit`/`logout`.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    principals: BTreeSet<Principal>,
    groups: BTreeMap<String, Group>,
}

impl Subject {
    /// Add an identity principal. Committing the same name again merges
    /// attributes instead of leaving two identically-named principals.
    pub fn add_principal(&mut self, principal: Principal) {
        if let Some(mut existing) = self.principals.take(&principal) {
            existing.attributes.extend(principal.attributes);
            self.principals.insert(existing);
        } else {
            self.principals.insert(principal);
        }
    }

    pub fn remove_principal(&mut self, name: &str) {
        self.principals.retain(|principal| principal.name() != name);
    }

    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.principals.iter()
    }

    /// The group with this name, created empty when first asked for.
    pub fn group_mut(&mut self, name: &str) -> &mut Group {
        self.groups.entry(name.to_string()).or_default()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.groups.iter().map(|(name, group)| (name.as_str(), group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_membership_is_a_set() {
        let mut group = Group::default();
        group.add_member(Principal::new("admin"));
        group.add_member(Principal::new("admin"));
        group.add_member(Principal::new("editor"));

        assert_eq!(group.len(), 2);
        assert!(group.is_member("admin"));
        assert!(!group.is_member("viewer"));
    }

    #[test]
    fn subject_groups_are_created_on_demand() {
        let mut subject = Subject::default();
        subject.group_mut("Roles").add_member(Principal::new("admin"));

        let roles = subject.group("Roles").unwrap();
        assert_eq!(roles.len(), 1);
        assert!(subject.group("CallerPrincipal").is_none());
    }

    #[test]
    fn same_name_with_and_without_attributes_is_one_principal() {
        let mut subject = Subject::default();
        let mut enriched = Principal::new("alice");
        enriched.set_attribute("email", "alice@example.com");
        subject.add_principal(enriched);
        subject.add_principal(Principal::new("alice"));

        assert_eq!(subject.principals().count(), 1);
        let alice = subject.principals().next().unwrap();
        assert_eq!(alice.attribute("email"), Some("alice@example.com"));
    }

    #[test]
    fn removing_a_principal_by_name() {
        let mut subject = Subject::default();
        subject.add_principal(Principal::new("alice"));
        subject.remove_principal("alice");
        assert_eq!(subject.principals().count(), 0);
    }
}
