//! Permission resolution
//!
//! Walks user -> user_role -> role -> role_menu -> menu and aggregates what a
//! user may see and invoke. Disabled or soft-deleted roles and disabled or
//! hidden menus contribute nothing. The resolver is read-only and uncached;
//! callers decide what to do with the result.

use async_trait::async_trait;
use futures::future::try_join_all;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::{BTreeSet, HashSet};

use crate::entity::{menu, role, role_menu, user_role, STATUS_NORMAL, VISIBLE_SHOW};
use crate::error::AccessError;
use crate::tree::{build_tree, ROOT_PARENT_ID};

/// Permission constants
pub mod perm {
    /// Grants every permission
    pub const ALL: &str = "*:*:*";

    pub const USER_LIST: &str = "system:user:list";
    pub const USER_QUERY: &str = "system:user:query";
    pub const USER_ADD: &str = "system:user:add";
    pub const USER_EDIT: &str = "system:user:edit";
    pub const USER_REMOVE: &str = "system:user:remove";
    pub const USER_RESET_PWD: &str = "system:user:resetPwd";

    pub const ROLE_LIST: &str = "system:role:list";
    pub const ROLE_QUERY: &str = "system:role:query";
    pub const ROLE_ADD: &str = "system:role:add";
    pub const ROLE_EDIT: &str = "system:role:edit";
    pub const ROLE_REMOVE: &str = "system:role:remove";

    pub const MENU_LIST: &str = "system:menu:list";
    pub const MENU_QUERY: &str = "system:menu:query";
    pub const MENU_ADD: &str = "system:menu:add";
    pub const MENU_EDIT: &str = "system:menu:edit";
    pub const MENU_REMOVE: &str = "system:menu:remove";

    pub const DEPT_LIST: &str = "system:dept:list";
    pub const DEPT_QUERY: &str = "system:dept:query";
    pub const DEPT_ADD: &str = "system:dept:add";
    pub const DEPT_EDIT: &str = "system:dept:edit";
    pub const DEPT_REMOVE: &str = "system:dept:remove";

    pub const POST_LIST: &str = "system:post:list";
    pub const POST_QUERY: &str = "system:post:query";
    pub const POST_ADD: &str = "system:post:add";
    pub const POST_EDIT: &str = "system:post:edit";
    pub const POST_REMOVE: &str = "system:post:remove";

    pub const DICT_LIST: &str = "system:dict:list";
    pub const DICT_QUERY: &str = "system:dict:query";
    pub const DICT_ADD: &str = "system:dict:add";
    pub const DICT_EDIT: &str = "system:dict:edit";
    pub const DICT_REMOVE: &str = "system:dict:remove";

    pub const LOGIN_LOG_LIST: &str = "monitor:logininfor:list";
    pub const LOGIN_LOG_REMOVE: &str = "monitor:logininfor:remove";
    pub const OPER_LOG_LIST: &str = "monitor:operlog:list";
    pub const OPER_LOG_REMOVE: &str = "monitor:operlog:remove";
}

/// Read-only slice of the entity store consumed by the resolver
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn user_roles(&self, user_id: &str) -> Result<Vec<user_role::Model>, AccessError>;

    async fn role(&self, role_id: &str) -> Result<Option<role::Model>, AccessError>;

    async fn role_menus(&self, role_id: &str) -> Result<Vec<role_menu::Model>, AccessError>;

    async fn menu(&self, menu_id: &str) -> Result<Option<menu::Model>, AccessError>;

    /// Menus among `ids` that are enabled and shown, ascending by order
    async fn visible_menus(&self, ids: &[String]) -> Result<Vec<menu::Model>, AccessError>;
}

#[async_trait]
impl AccessStore for DatabaseConnection {
    async fn user_roles(&self, user_id: &str) -> Result<Vec<user_role::Model>, AccessError> {
        Ok(user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .all(self)
            .await?)
    }

    async fn role(&self, role_id: &str) -> Result<Option<role::Model>, AccessError> {
        Ok(role::Entity::find_by_id(role_id.to_string()).one(self).await?)
    }

    async fn role_menus(&self, role_id: &str) -> Result<Vec<role_menu::Model>, AccessError> {
        Ok(role_menu::Entity::find()
            .filter(role_menu::Column::RoleId.eq(role_id))
            .all(self)
            .await?)
    }

    async fn menu(&self, menu_id: &str) -> Result<Option<menu::Model>, AccessError> {
        Ok(menu::Entity::find_by_id(menu_id.to_string()).one(self).await?)
    }

    async fn visible_menus(&self, ids: &[String]) -> Result<Vec<menu::Model>, AccessError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(menu::Entity::find()
            .filter(menu::Column::Id.is_in(ids.iter().cloned()))
            .filter(menu::Column::Status.eq(STATUS_NORMAL))
            .filter(menu::Column::Visible.eq(VISIBLE_SHOW))
            .order_by_asc(menu::Column::OrderNum)
            .order_by_asc(menu::Column::Id)
            .all(self)
            .await?)
    }
}

#[async_trait]
impl<S: AccessStore + ?Sized> AccessStore for &S {
    async fn user_roles(&self, user_id: &str) -> Result<Vec<user_role::Model>, AccessError> {
        (**self).user_roles(user_id).await
    }

    async fn role(&self, role_id: &str) -> Result<Option<role::Model>, AccessError> {
        (**self).role(role_id).await
    }

    async fn role_menus(&self, role_id: &str) -> Result<Vec<role_menu::Model>, AccessError> {
        (**self).role_menus(role_id).await
    }

    async fn menu(&self, menu_id: &str) -> Result<Option<menu::Model>, AccessError> {
        (**self).menu(menu_id).await
    }

    async fn visible_menus(&self, ids: &[String]) -> Result<Vec<menu::Model>, AccessError> {
        (**self).visible_menus(ids).await
    }
}

/// What a user may see and invoke
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccess {
    /// Keys of the effective roles
    pub role_keys: Vec<String>,
    pub permissions: HashSet<String>,
    pub menus: Vec<menu::Model>,
}

impl ResolvedAccess {
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.menus.is_empty()
    }

    /// Permissions in a stable order, for tokens and responses
    pub fn sorted_permissions(&self) -> Vec<String> {
        self.permissions
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Resolves roles, permissions and menus for a user id
#[derive(Clone)]
pub struct PermissionResolver<S> {
    store: S,
}

impl<S: AccessStore> PermissionResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Roles of the user that are enabled and not soft-deleted
    pub async fn effective_roles(&self, user_id: &str) -> Result<Vec<role::Model>, AccessError> {
        let links = self.store.user_roles(user_id).await?;
        let roles = try_join_all(links.iter().map(|link| self.store.role(&link.role_id))).await?;

        let mut seen = HashSet::new();
        Ok(roles
            .into_iter()
            .flatten()
            .filter(|r| r.is_effective())
            .filter(|r| seen.insert(r.id.clone()))
            .collect())
    }

    /// Keys of the effective roles, e.g. `admin`
    pub async fn role_keys(&self, user_id: &str) -> Result<Vec<String>, AccessError> {
        Ok(self
            .effective_roles(user_id)
            .await?
            .into_iter()
            .map(|r| r.role_key)
            .collect())
    }

    /// Full resolution: permission set plus display-ordered menu list
    pub async fn resolve(&self, user_id: &str) -> Result<ResolvedAccess, AccessError> {
        let roles = self.effective_roles(user_id).await?;
        if roles.is_empty() {
            return Ok(ResolvedAccess::default());
        }
        let role_keys: Vec<String> = roles.iter().map(|r| r.role_key.clone()).collect();

        let per_role = try_join_all(roles.iter().map(|r| self.role_visible_menus(&r.id))).await?;

        let mut permissions = HashSet::new();
        let mut menu_ids: Vec<String> = Vec::new();
        let mut seen_ids = HashSet::new();
        for menu in per_role.into_iter().flatten() {
            if let Some(p) = menu.permission() {
                permissions.insert(p.to_string());
            }
            if seen_ids.insert(menu.id.clone()) {
                menu_ids.push(menu.id);
            }
        }

        // Re-read so the list reflects current flags and display order
        let menus = self.store.visible_menus(&menu_ids).await?;

        tracing::debug!(
            user_id,
            roles = roles.len(),
            permissions = permissions.len(),
            menus = menus.len(),
            "Resolved access"
        );

        Ok(ResolvedAccess {
            role_keys,
            permissions,
            menus,
        })
    }

    pub async fn permissions(&self, user_id: &str) -> Result<HashSet<String>, AccessError> {
        Ok(self.resolve(user_id).await?.permissions)
    }

    pub async fn menus(&self, user_id: &str) -> Result<Vec<menu::Model>, AccessError> {
        Ok(self.resolve(user_id).await?.menus)
    }

    /// Visible menus nested for sidebar navigation; buttons are left out
    pub async fn menu_tree(&self, user_id: &str) -> Result<Vec<menu::MenuTree>, AccessError> {
        let nodes: Vec<menu::MenuTree> = self
            .menus(user_id)
            .await?
            .into_iter()
            .filter(|m| m.menu_type != menu::MenuType::Button.as_str())
            .map(menu::MenuTree::from)
            .collect();

        let forest = build_tree(nodes, ROOT_PARENT_ID);
        let mut roots = forest.roots;
        // A granted page whose directory is not granted still shows up
        roots.extend(forest.orphans);
        Ok(roots)
    }

    async fn role_visible_menus(&self, role_id: &str) -> Result<Vec<menu::Model>, AccessError> {
        let links = self.store.role_menus(role_id).await?;
        let menus = try_join_all(links.iter().map(|link| self.store.menu(&link.menu_id))).await?;
        Ok(menus.into_iter().flatten().filter(|m| m.is_visible()).collect())
    }
}

/// Whether a resolved permission set allows `required`
pub fn has_permission<S: AsRef<str>>(permissions: &[S], required: &str) -> bool {
    permissions
        .iter()
        .any(|p| p.as_ref() == perm::ALL || p.as_ref() == required)
}

/// Whether a role key list contains `required`
pub fn has_role<S: AsRef<str>>(roles: &[S], required: &str) -> bool {
    roles.iter().any(|r| r.as_ref() == required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory entity store
    #[derive(Default)]
    struct MemoryStore {
        user_roles: Vec<user_role::Model>,
        roles: HashMap<String, role::Model>,
        role_menus: Vec<role_menu::Model>,
        menus: HashMap<String, menu::Model>,
        fail: bool,
        calls: Mutex<usize>,
    }

    impl MemoryStore {
        fn check(&self) -> Result<(), AccessError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(AccessError::LookupFailed("connection refused".to_string()));
            }
            Ok(())
        }

        fn with_role(mut self, role: role::Model) -> Self {
            self.roles.insert(role.id.clone(), role);
            self
        }

        fn with_menu(mut self, menu: menu::Model) -> Self {
            self.menus.insert(menu.id.clone(), menu);
            self
        }

        fn grant(mut self, user_id: &str, role_id: &str) -> Self {
            self.user_roles.push(user_role::Model {
                user_id: user_id.to_string(),
                role_id: role_id.to_string(),
            });
            self
        }

        fn link(mut self, role_id: &str, menu_id: &str) -> Self {
            self.role_menus.push(role_menu::Model {
                role_id: role_id.to_string(),
                menu_id: menu_id.to_string(),
            });
            self
        }
    }

    #[async_trait]
    impl AccessStore for MemoryStore {
        async fn user_roles(&self, user_id: &str) -> Result<Vec<user_role::Model>, AccessError> {
            self.check()?;
            Ok(self.user_roles.iter().filter(|l| l.user_id == user_id).cloned().collect())
        }

        async fn role(&self, role_id: &str) -> Result<Option<role::Model>, AccessError> {
            self.check()?;
            Ok(self.roles.get(role_id).cloned())
        }

        async fn role_menus(&self, role_id: &str) -> Result<Vec<role_menu::Model>, AccessError> {
            self.check()?;
            Ok(self.role_menus.iter().filter(|l| l.role_id == role_id).cloned().collect())
        }

        async fn menu(&self, menu_id: &str) -> Result<Option<menu::Model>, AccessError> {
            self.check()?;
            Ok(self.menus.get(menu_id).cloned())
        }

        async fn visible_menus(&self, ids: &[String]) -> Result<Vec<menu::Model>, AccessError> {
            self.check()?;
            let mut menus: Vec<menu::Model> = ids
                .iter()
                .filter_map(|id| self.menus.get(id))
                .filter(|m| m.is_visible())
                .cloned()
                .collect();
            menus.sort_by(|a, b| a.order_num.cmp(&b.order_num).then_with(|| a.id.cmp(&b.id)));
            Ok(menus)
        }
    }

    fn role(id: &str, key: &str, status: &str, del_flag: &str) -> role::Model {
        role::Model {
            id: id.to_string(),
            role_name: key.to_string(),
            role_key: key.to_string(),
            role_sort: 1,
            data_scope: "1".to_string(),
            menu_check_strictly: false,
            dept_check_strictly: false,
            status: status.to_string(),
            del_flag: del_flag.to_string(),
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
            remark: None,
        }
    }

    fn menu(id: &str, parent_id: &str, order_num: i32, visible: &str, status: &str, perms: Option<&str>) -> menu::Model {
        menu::Model {
            id: id.to_string(),
            menu_name: id.to_string(),
            parent_id: parent_id.to_string(),
            order_num,
            path: None,
            component: None,
            query: None,
            is_frame: "1".to_string(),
            is_cache: "0".to_string(),
            menu_type: "C".to_string(),
            visible: visible.to_string(),
            status: status.to_string(),
            perms: perms.map(str::to_string),
            icon: None,
            create_by: None,
            create_time: 0,
            update_by: None,
            update_time: 0,
            remark: None,
        }
    }

    fn perms(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn menu_ids(access: &ResolvedAccess) -> Vec<&str> {
        access.menus.iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_user_without_roles_resolves_empty() {
        let store = MemoryStore::default()
            .with_menu(menu("m1", "0", 1, "0", "0", Some("system:user:list")));
        let resolver = PermissionResolver::new(store);

        let access = resolver.resolve("nobody").await.unwrap();
        assert!(access.is_empty());
        assert_eq!(access, ResolvedAccess::default());
    }

    #[tokio::test]
    async fn test_hidden_menu_excluded() {
        let store = MemoryStore::default()
            .with_role(role("r", "editor", "0", "0"))
            .with_menu(menu("m1", "0", 1, "0", "0", Some("system:user:list")))
            .with_menu(menu("m2", "0", 2, "1", "0", Some("system:user:hidden")))
            .grant("u", "r")
            .link("r", "m1")
            .link("r", "m2");
        let resolver = PermissionResolver::new(store);

        let access = resolver.resolve("u").await.unwrap();
        assert_eq!(access.permissions, perms(&["system:user:list"]));
        assert_eq!(menu_ids(&access), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_disabled_and_deleted_roles_contribute_nothing() {
        let store = MemoryStore::default()
            .with_role(role("disabled", "d", "1", "0"))
            .with_role(role("deleted", "x", "0", "2"))
            .with_role(role("flagged", "f", "0", "1"))
            .with_menu(menu("m1", "0", 1, "0", "0", Some("a:b:c")))
            .grant("u", "disabled")
            .grant("u", "deleted")
            .grant("u", "flagged")
            .link("disabled", "m1")
            .link("deleted", "m1")
            .link("flagged", "m1");
        let resolver = PermissionResolver::new(store);

        assert!(resolver.resolve("u").await.unwrap().is_empty());
        assert!(resolver.role_keys("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_menu_never_listed() {
        let store = MemoryStore::default()
            .with_role(role("r", "editor", "0", "0"))
            .with_menu(menu("m1", "0", 1, "0", "1", Some("system:post:list")))
            .grant("u", "r")
            .link("r", "m1");
        let resolver = PermissionResolver::new(store);

        assert!(resolver.resolve("u").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_union_across_roles_deduplicates() {
        let store = MemoryStore::default()
            .with_role(role("r1", "a", "0", "0"))
            .with_role(role("r2", "b", "0", "0"))
            .with_menu(menu("m1", "0", 3, "0", "0", Some("system:user:list")))
            .with_menu(menu("m2", "0", 1, "0", "0", Some("system:role:list")))
            .with_menu(menu("dir", "0", 2, "0", "0", None))
            .grant("u", "r1")
            .grant("u", "r2")
            .grant("u", "missing-role")
            .link("r1", "m1")
            .link("r1", "dir")
            .link("r2", "m1")
            .link("r2", "m2")
            .link("r2", "missing-menu");
        let resolver = PermissionResolver::new(store);

        let access = resolver.resolve("u").await.unwrap();
        assert_eq!(access.permissions, perms(&["system:user:list", "system:role:list"]));
        assert_eq!(menu_ids(&access), vec!["m2", "dir", "m1"]);
        let mut resolved_keys = access.role_keys.clone();
        resolved_keys.sort();
        assert_eq!(resolved_keys, vec!["a", "b"]);
        assert_eq!(
            access.sorted_permissions(),
            vec!["system:role:list".to_string(), "system:user:list".to_string()]
        );

        let mut keys = resolver.role_keys("u").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let store = MemoryStore::default()
            .with_role(role("r", "editor", "0", "0"))
            .with_menu(menu("m1", "0", 2, "0", "0", Some("p:1")))
            .with_menu(menu("m2", "0", 1, "0", "0", Some("p:2")))
            .grant("u", "r")
            .link("r", "m1")
            .link("r", "m2");
        let resolver = PermissionResolver::new(store);

        let first = resolver.resolve("u").await.unwrap();
        let second = resolver.resolve("u").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(menu_ids(&first), vec!["m2", "m1"]);
    }

    #[tokio::test]
    async fn test_store_failure_is_lookup_failed() {
        let store = MemoryStore {
            fail: true,
            ..Default::default()
        };
        let resolver = PermissionResolver::new(store);

        let err = resolver.resolve("u").await.unwrap_err();
        assert!(matches!(err, AccessError::LookupFailed(_)));
        // No retry
        assert_eq!(*resolver.store.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_menu_tree_nests_and_skips_buttons() {
        let mut button = menu("btn", "page", 1, "0", "0", Some("system:user:add"));
        button.menu_type = "F".to_string();
        let mut dir = menu("dir", "0", 1, "0", "0", None);
        dir.menu_type = "M".to_string();

        let store = MemoryStore::default()
            .with_role(role("r", "editor", "0", "0"))
            .with_menu(dir)
            .with_menu(menu("page", "dir", 1, "0", "0", Some("system:user:list")))
            .with_menu(button)
            .with_menu(menu("lone", "ungranted-dir", 5, "0", "0", Some("system:post:list")))
            .grant("u", "r")
            .link("r", "dir")
            .link("r", "page")
            .link("r", "btn")
            .link("r", "lone");
        let resolver = PermissionResolver::new(store);

        let tree = resolver.menu_tree("u").await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].menu.id, "dir");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].menu.id, "page");
        assert!(tree[0].children[0].children.is_empty());
        assert_eq!(tree[1].menu.id, "lone");

        let permissions = resolver.permissions("u").await.unwrap();
        assert!(permissions.contains("system:user:add"));
    }

    #[tokio::test]
    async fn test_menu_tree_nests_under_ungranted_parent() {
        let mut sub = menu("sub", "ungranted-dir", 2, "0", "0", None);
        sub.menu_type = "M".to_string();

        let store = MemoryStore::default()
            .with_role(role("r", "editor", "0", "0"))
            .with_menu(sub)
            .with_menu(menu("page-2", "sub", 2, "0", "0", Some("system:dict:list")))
            .with_menu(menu("page-1", "sub", 1, "0", "0", Some("system:post:list")))
            .grant("u", "r")
            .link("r", "sub")
            .link("r", "page-2")
            .link("r", "page-1");
        let resolver = PermissionResolver::new(store);

        let tree = resolver.menu_tree("u").await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].menu.id, "sub");
        let children: Vec<&str> = tree[0].children.iter().map(|c| c.menu.id.as_str()).collect();
        assert_eq!(children, vec!["page-1", "page-2"]);
    }

    #[test]
    fn test_has_permission_and_role() {
        let granted = vec!["system:user:list".to_string()];
        assert!(has_permission(&granted, "system:user:list"));
        assert!(!has_permission(&granted, "system:user:add"));
        assert!(has_permission(&[perm::ALL], "anything:at:all"));

        assert!(has_role(&["admin"], "admin"));
        assert!(!has_role::<&str>(&[], "admin"));
    }

    #[test]
    fn test_resolver_blocking_call() {
        let store = MemoryStore::default()
            .with_role(role("r", "admin", "0", "0"))
            .grant("u", "r");
        let resolver = PermissionResolver::new(store);
        let keys = tokio_test::block_on(resolver.role_keys("u")).unwrap();
        assert_eq!(keys, vec!["admin"]);
    }
}
