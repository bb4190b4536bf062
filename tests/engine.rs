use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use php_shape::inference::rules::parse_pipe;
use php_shape::inference::{Inference, ResolutionContext, RuleSet};
use php_shape::ir::{Format, Kind, Scalar, SchemaNode};
use php_shape::source::SourceIndex;
use php_shape::{InferConfig, emit};

const MODELS: &str = r#"<?php
namespace App\Models;

enum Status: string {
    case Draft = 'draft';
    case Published = 'published';
}

class Author {
    public int $id;
    public string $email;
    public Book $latest;
}

class Book {
    public string $title;
    public Status $status;
    public ?\Carbon\Carbon $published_at;
    public Author $author;
}
"#;

const RESOURCES: &str = r#"<?php
namespace App\Http\Resources;

use Illuminate\Http\Resources\Json\JsonResource;

class PostResource extends JsonResource {
    public function toArray($request): array {
        return [
            'id' => $this->id,
            'items' => $this->tags->map(fn ($t) => $t->name),
            'email' => $this->when($request->user()->isAdmin(), $this->email),
            'author' => new AuthorResource($this->whenLoaded('author')),
        ];
    }
}

class AuthorResource extends JsonResource {
    public function toArray($request): array {
        return ['id' => $this->id, 'name' => $this->name];
    }
}

class ProfileData {
    public string $display_name;

    public function toArray(): array {
        return ['something_else' => 1];
    }
}
"#;

const REQUESTS: &str = r#"<?php
namespace App\Http\Requests;

class StoreOrderRequest {
    public function rules(): array {
        return [
            'contact' => ['required', 'email'],
            'qty' => 'nullable|integer|min:1|max:10',
            'items.*.name' => 'required|string',
            'meta.a' => 'string',
            'meta.b' => 'integer',
        ];
    }
}
"#;

const CONTROLLERS: &str = r#"<?php
namespace App\Http\Controllers;

use App\Http\Requests\StoreOrderRequest;
use App\Http\Resources\PostResource;

class OrderController {
    public function store(StoreOrderRequest $request): PostResource {
        return new PostResource($request->user());
    }

    public function index() {
        return PostResource::collection(Post::all());
    }

    public function destroy($id) {
        Order::find($id)->delete();
    }
}
"#;

const GRAPH: &str = r#"<?php
namespace App\Graph;

class Left {
    public Right $right;
}

class Right {
    public Left $left;
}

class First {
    public Second $next;
}

class Second {
    public Third $next;
}

class Third {
    public int $id;
}
"#;

const COLLECTIONS: &str = r#"<?php
namespace App\Http\Resources;

use Illuminate\Http\Resources\Json\ResourceCollection;

class UserCollection extends ResourceCollection {
    public $collects = AuthorResource::class;

    public function toArray($request): array {
        return ['data' => $this->collection, 'total' => count($this->collection)];
    }
}
"#;

struct Fixture {
    _dir: TempDir,
    paths: Vec<PathBuf>,
}

fn write_fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let paths = [
        ("Models.php", MODELS),
        ("Resources.php", RESOURCES),
        ("Requests.php", REQUESTS),
        ("Controllers.php", CONTROLLERS),
        ("Graph.php", GRAPH),
        ("Collections.php", COLLECTIONS),
    ]
    .into_iter()
    .map(|(name, text)| {
        let path = dir.path().join(name);
        std::fs::write(&path, text).expect("write fixture");
        path
    })
    .collect();
    Fixture { _dir: dir, paths }
}

fn engine_with(fixture: &Fixture, config: InferConfig) -> Inference {
    let index = SourceIndex::new();
    for path in &fixture.paths {
        index.add_file(path).expect("fixture parses");
    }
    Inference::with_config(Arc::new(index), config)
}

/// Structural assertions read better without synthesized examples.
fn bare_config() -> InferConfig {
    InferConfig { synthesize_examples: false, ..InferConfig::default() }
}

fn output(engine: &Inference, target: &str) -> SchemaNode {
    let subject = engine.subject(target).expect("subject exists");
    engine.infer_output_schema(&subject)
}

fn input(engine: &Inference, target: &str, rules: Option<&RuleSet>) -> SchemaNode {
    let subject = engine.subject(target).expect("subject exists");
    engine.infer_input_schema(&subject, rules)
}

#[test]
fn mutual_references_end_in_one_placeholder() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let author = output(&engine, "App\\Models\\Author");

    assert_eq!(author.count_where(&|n| n.is_circular_placeholder()), 1);
    let back = author
        .property("latest")
        .and_then(|b| b.property("author"))
        .expect("book links back to its author");
    assert!(back.is_circular_placeholder());
    assert_eq!(back.title.as_deref(), Some("Author"));
    assert_eq!(author.property("email").and_then(|e| e.format), Some(Format::Email));
}

#[test]
fn reinference_is_identical_and_cached() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, InferConfig::default());
    let first = output(&engine, "App\\Models\\Author");
    let second = output(&engine, "App\\Models\\Author");
    assert_eq!(first, second);
    assert!(engine.cache_stats().hits >= 1);
}

#[test]
fn inference_order_does_not_change_results() {
    let fixture = write_fixture();

    let fresh = engine_with(&fixture, bare_config());
    let right_alone = output(&fresh, "App\\Graph\\Right");

    let warmed = engine_with(&fixture, bare_config());
    output(&warmed, "App\\Graph\\Left");
    let right_after_left = output(&warmed, "App\\Graph\\Right");

    assert_eq!(right_alone, right_after_left);
    assert_eq!(right_alone.count_where(&|n| n.is_circular_placeholder()), 1);
}

#[test]
fn cached_subtrees_respect_the_depth_limit() {
    let fixture = write_fixture();
    let config = InferConfig { max_depth: 2, ..bare_config() };

    let fresh = engine_with(&fixture, config.clone());
    let first_alone = output(&fresh, "First");

    let warmed = engine_with(&fixture, config);
    output(&warmed, "Second");
    let first_after_second = output(&warmed, "First");

    assert_eq!(first_alone, first_after_second);
    let cut = first_alone.property("next").and_then(|n| n.property("next")).expect("third level");
    assert!(cut.description.as_deref().is_some_and(|d| d.contains("depth limit")));
}

#[test]
fn resource_configuration_properties_do_not_hide_to_array() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let users = output(&engine, "UserCollection");
    assert!(users.property("collects").is_none());
    assert_eq!(users.property("total").map(|n| n.kind()), Some(Kind::Integer));
    assert!(users.property("data").is_some());
}

#[test]
fn known_types_and_enums() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let book = output(&engine, "Book");
    let status = book.property("status").expect("status");
    assert_eq!(status.kind(), Kind::String);
    assert_eq!(
        status.enum_values,
        vec![Scalar::String("draft".into()), Scalar::String("published".into())]
    );
    let published = book.property("published_at").expect("published_at");
    assert_eq!(published.format, Some(Format::DateTime));
    assert!(published.nullable);
}

#[test]
fn declared_fields_win_over_body_shape() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let profile = output(&engine, "ProfileData");
    assert!(profile.property("display_name").is_some());
    assert!(profile.property("something_else").is_none());
}

#[test]
fn resource_body_shape() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let post = output(&engine, "App\\Http\\Resources\\PostResource");

    assert_eq!(post.property("id").map(|n| n.kind()), Some(Kind::Integer));
    assert_eq!(
        post.property("items").and_then(|n| n.items()).map(|n| n.kind()),
        Some(Kind::String)
    );
    let email = post.property("email").expect("email");
    assert!(email.conditional);
    assert!(!email.required);
    assert_eq!(email.format, Some(Format::Email));

    let author = post.property("author").expect("author");
    assert!(author.conditional);
    assert!(author.property("name").is_some());
}

#[test]
fn controller_outputs_follow_the_tiers() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());

    // declared return type
    let store = output(&engine, "OrderController@store");
    assert!(store.property("items").is_some());

    // body shape
    let index = output(&engine, "OrderController::index");
    assert_eq!(index.kind(), Kind::Array);
    assert!(index.items().and_then(|i| i.property("email")).is_some());

    // name default
    let destroy = output(&engine, "OrderController@destroy");
    assert!(destroy.property("message").is_some());
}

#[test]
fn form_request_rules_become_the_input() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let body = input(&engine, "OrderController@store", None);

    assert_eq!(
        body.property("contact"),
        Some(&SchemaNode::string().with_format(Format::Email).with_required(true))
    );
    let qty = body.property("qty").expect("qty");
    assert_eq!(qty.kind(), Kind::Integer);
    assert!(qty.nullable && !qty.required);
    assert_eq!((qty.constraints.minimum, qty.constraints.maximum), (Some(1.0), Some(10.0)));

    let element = body.property("items").and_then(|i| i.items()).expect("items element");
    assert_eq!(element.property("name"), Some(&SchemaNode::string().with_required(true)));

    let meta = body.property("meta").expect("meta");
    assert_eq!(meta.kind(), Kind::Object);
    assert_eq!(meta.property("a").map(|n| n.kind()), Some(Kind::String));
    assert_eq!(meta.property("b").map(|n| n.kind()), Some(Kind::Integer));
}

#[test]
fn supplied_rules_take_priority() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let rules: RuleSet = [("note".to_string(), parse_pipe("required|string|max:140"))].into_iter().collect();
    let body = input(&engine, "OrderController@store", Some(&rules));
    assert!(body.property("contact").is_none());
    assert_eq!(body.property("note").and_then(|n| n.constraints.max_length), Some(140));
}

#[test]
fn depth_limit_cuts_recursion() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, InferConfig { max_depth: 1, ..bare_config() });
    let author = output(&engine, "Author");
    let latest = author.property("latest").expect("latest");
    assert!(latest.description.as_deref().is_some_and(|d| d.contains("depth limit")));
    assert_eq!(author.count_where(&|n| n.is_circular_placeholder()), 0);
}

#[test]
fn examples_are_synthesized() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, InferConfig::default());
    let body = input(&engine, "OrderController@store", None);
    let contact = body.property("contact").expect("contact");
    assert_eq!(contact.example, Some("user@example.com".into()));

    let schema = emit::schema(&body);
    assert_eq!(schema["required"], serde_json::json!(["contact"]));
    assert_eq!(schema["properties"]["contact"]["example"], "user@example.com");
}

#[test]
fn resolve_type_uses_the_files_imports() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    let controller = engine.index().class("App\\Http\\Controllers\\OrderController").expect("controller");
    let ctx = ResolutionContext::for_class(&controller);
    assert_eq!(engine.resolve_type("PostResource", &ctx), "App\\Http\\Resources\\PostResource");
    assert_eq!(engine.resolve_type("Helper", &ctx), "App\\Http\\Controllers\\Helper");
    assert_eq!(engine.resolve_type("\\Carbon\\Carbon", &ctx), "Carbon\\Carbon");
}

#[test]
fn invalidation_drops_cached_schemas() {
    let fixture = write_fixture();
    let engine = engine_with(&fixture, bare_config());
    output(&engine, "App\\Models\\Author");
    assert!(engine.cache_stats().entries > 0);

    engine.invalidate(Path::new(&fixture.paths[0]));
    assert_eq!(engine.cache_stats().entries, 0);
    assert!(engine.subject("App\\Models\\Author").is_err());
}

#[test]
fn swapped_tables_change_name_defaults() {
    let fixture = write_fixture();
    let mut tables = php_shape::heuristics::Heuristics::standard().clone();
    tables.defaults.delete_prefixes.clear();
    let engine = engine_with(&fixture, bare_config()).with_heuristics(Arc::new(tables));
    let destroy = output(&engine, "OrderController@destroy");
    assert!(destroy.property("message").is_none());
    assert!(destroy.property("id").is_some());
}
